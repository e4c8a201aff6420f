use std::io;
use thiserror::Error;

use crate::WorkerId;

/// Error type for thread group operations.
#[derive(Error, Debug)]
pub enum ThreadGroupError {
    /// The host refused to create a new thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// Join or detach was requested for a worker already joined or detached.
    #[error("worker {id} was already joined or detached")]
    DoubleTermination {
        /// The worker that was terminated twice.
        id: WorkerId,
    },

    /// The group was destroyed while workers were still outstanding.
    #[error("thread group leaked {outstanding} worker(s) that were neither joined nor detached")]
    LeakedWorker {
        /// Number of workers still running when the group ended.
        outstanding: usize,
    },

    /// A bounded join ran out of time before every worker finished.
    ///
    /// The unfinished workers stay outstanding and can be joined again.
    #[error("join interrupted: {joined} joined, {remaining} still outstanding")]
    JoinInterrupted {
        /// Workers joined before the interruption.
        joined: usize,
        /// Workers still outstanding.
        remaining: usize,
    },

    /// The handle does not belong to this group.
    #[error("worker {id} does not belong to this group")]
    UnknownWorker {
        /// The foreign worker id.
        id: WorkerId,
    },
}

/// Result type alias for thread group operations.
pub type Result<T> = std::result::Result<T, ThreadGroupError>;
