use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A counter shared by reference between the caller and its tasks.
///
/// Clones point at the same value. `increment` is a plain load followed
/// by a store, not an atomic read-modify-write: two tasks incrementing
/// at the same time can lose an update. Callers that need exact counts
/// must synchronize themselves; the group adds no locking.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    value: Arc<AtomicU64>,
}

impl SharedCounter {
    /// Creates a counter starting at `initial`.
    pub fn new(initial: u64) -> Self {
        SharedCounter {
            value: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Adds one without synchronizing with other writers.
    pub fn increment(&self) {
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current + 1, Ordering::Relaxed);
    }

    /// Reads the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A counter with value semantics.
///
/// Moving a clone into a task leaves the caller's copy untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    value: u64,
}

impl Counter {
    /// Creates a counter starting at `initial`.
    pub fn new(initial: u64) -> Self {
        Counter { value: initial }
    }

    /// Adds one.
    pub fn increment(&mut self) {
        self.value += 1;
    }

    /// Reads the current value.
    pub fn get(&self) -> u64 {
        self.value
    }
}
