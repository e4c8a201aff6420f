use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use log::{debug, error};

use crate::{Result, ThreadGroupError};

/// Source of process-wide unique worker ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one worker.
///
/// Ids are unique across every group in the process and increase in
/// submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        WorkerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a worker.
///
/// `Running` is the only non-terminal state. A worker leaves it exactly
/// once, for either `Joined` or `Detached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Started and not yet joined or detached.
    Running,
    /// Completion was waited for by the group's owner.
    Joined,
    /// Completion was handed off to the runtime.
    Detached,
}

impl WorkerState {
    /// Returns `true` for `Joined` and `Detached`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkerState::Running)
    }
}

/// Ticket for a submitted worker.
///
/// Handles are move-only: passing one to `ThreadGroup::join` or
/// `ThreadGroup::detach` consumes it. The recorded generation catches
/// the remaining double-termination case, where the worker was already
/// terminated through `join_all` or `detach_all`.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkerHandle {
    id: WorkerId,
    generation: u64,
}

impl WorkerHandle {
    /// The id of the worker this handle refers to.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The worker generation this handle was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Group-side record of one worker.
///
/// The spawned thread returns `true` if its task panicked.
pub(crate) struct Worker {
    id: WorkerId,
    state: WorkerState,
    generation: u64,
    thread: Option<JoinHandle<bool>>,
    finished: bool,
    panicked: bool,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, thread: JoinHandle<bool>) -> Self {
        Worker {
            id,
            state: WorkerState::Running,
            generation: 0,
            thread: Some(thread),
            finished: false,
            panicked: false,
        }
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            generation: self.generation,
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    /// Whether the task is known to have returned.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn panicked(&self) -> bool {
        self.panicked
    }

    /// Records a completion signal sent by the worker thread.
    pub(crate) fn mark_finished(&mut self, panicked: bool) {
        self.finished = true;
        self.panicked |= panicked;
    }

    /// Rejects handles issued for an earlier generation of this worker.
    pub(crate) fn check_handle(&self, handle: &WorkerHandle) -> Result<()> {
        if handle.generation != self.generation || self.state.is_terminal() {
            return Err(ThreadGroupError::DoubleTermination { id: self.id });
        }
        Ok(())
    }

    /// Blocks until the thread exits. `Running -> Joined`.
    pub(crate) fn join(&mut self) -> Result<()> {
        let id = self.id;
        let thread = self.terminate(WorkerState::Joined)?;
        match thread.join() {
            Ok(panicked) => self.mark_finished(panicked),
            Err(_) => {
                error!("Worker {id} unwound past its panic guard");
                self.mark_finished(true);
            }
        }
        debug!("Worker {id} joined");
        Ok(())
    }

    /// Releases the thread to run on its own. `Running -> Detached`.
    pub(crate) fn detach(&mut self) -> Result<()> {
        // Dropping a std JoinHandle detaches the thread.
        drop(self.terminate(WorkerState::Detached)?);
        let id = self.id;
        debug!("Worker {id} detached");
        Ok(())
    }

    fn terminate(&mut self, next: WorkerState) -> Result<JoinHandle<bool>> {
        if self.state.is_terminal() {
            return Err(ThreadGroupError::DoubleTermination { id: self.id });
        }
        let thread = self
            .thread
            .take()
            .ok_or(ThreadGroupError::DoubleTermination { id: self.id })?;
        self.state = next;
        self.generation += 1;
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn spawn_worker(panics: bool) -> Worker {
        let thread = thread::spawn(move || panics);
        Worker::new(WorkerId::next(), thread)
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert!(a < b);
        assert_ne!(a, b);
        assert_eq!(format!("{}", a), format!("#{}", a.as_u64()));
    }

    #[test]
    fn join_moves_running_to_joined() {
        let mut worker = spawn_worker(false);
        let handle = worker.handle();
        assert_eq!(worker.state(), WorkerState::Running);
        assert!(worker.check_handle(&handle).is_ok());

        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Joined);
        assert!(worker.is_finished());
        assert!(!worker.panicked());
    }

    #[test]
    fn detach_moves_running_to_detached() {
        let mut worker = spawn_worker(false);
        worker.detach().unwrap();
        assert_eq!(worker.state(), WorkerState::Detached);
        assert!(worker.state().is_terminal());
    }

    #[test]
    fn second_termination_is_rejected() {
        let mut worker = spawn_worker(false);
        worker.join().unwrap();

        let id = worker.id();
        assert!(matches!(
            worker.join(),
            Err(ThreadGroupError::DoubleTermination { id: i }) if i == id
        ));
        assert!(matches!(
            worker.detach(),
            Err(ThreadGroupError::DoubleTermination { .. })
        ));
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut worker = spawn_worker(false);
        let handle = worker.handle();
        assert_eq!(handle.generation(), 0);

        worker.detach().unwrap();
        assert!(matches!(
            worker.check_handle(&handle),
            Err(ThreadGroupError::DoubleTermination { .. })
        ));
    }

    #[test]
    fn join_records_reported_panic() {
        let mut worker = spawn_worker(true);
        worker.join().unwrap();
        assert!(worker.panicked());
    }
}
