#![deny(missing_docs)]

//! A structured thread-group runner.
//!
//! A [`ThreadGroup`] starts one OS thread per submitted task and tracks
//! every worker until it is explicitly joined or detached. Dropping a
//! group that still has outstanding workers is treated as a bug and
//! panics.
//!
//! Tasks must own what they capture. Handing a worker a borrow of the
//! caller's stack does not compile:
//!
//! ```compile_fail
//! use threadgroup::ThreadGroup;
//!
//! let mut group = ThreadGroup::new();
//! let buffer = String::from("Hello");
//! let msg: &str = &buffer;
//! group.submit(move || println!("Worker received: {}", msg)).unwrap();
//! group.detach_all();
//! ```
//!
//! Copy the data into an owned payload instead:
//!
//! ```
//! use threadgroup::ThreadGroup;
//!
//! let mut group = ThreadGroup::new();
//! let buffer = String::from("Hello");
//! group
//!     .submit_with(buffer.clone(), |msg| println!("Worker received: {}", msg))
//!     .unwrap();
//! drop(buffer);
//! assert_eq!(group.join_all().unwrap(), 1);
//! ```
//!
//! Sharing is explicit: the caller builds a [`SharedCounter`] and clones
//! it into the tasks. The group adds no locking, so unsynchronized
//! updates race exactly as they would on bare threads.

mod config;
mod error;
mod group;
mod shared;
mod task;
mod worker;

pub use config::{GroupConfig, DEFAULT_NAME_PREFIX};
pub use error::{Result, ThreadGroupError};
pub use group::ThreadGroup;
pub use shared::{Counter, SharedCounter};
pub use task::Task;
pub use worker::{WorkerHandle, WorkerId, WorkerState};
