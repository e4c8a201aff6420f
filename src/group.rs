use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, warn};

use crate::config::GroupConfig;
use crate::task::Task;
use crate::worker::{Worker, WorkerHandle, WorkerId, WorkerState};
use crate::{Result, ThreadGroupError};

/// Sent by a worker thread once its task has returned or panicked.
struct Completion {
    id: WorkerId,
    panicked: bool,
}

/// Owns a dynamic set of worker threads, one per submitted task.
///
/// Every worker must be joined or detached before the group is dropped.
/// Dropping a group with outstanding workers is a usage error and panics;
/// use [`ThreadGroup::finish`] to get the same check as an error value.
///
/// The group adds no synchronization between tasks. Execution order among
/// tasks is unspecified; the only ordering guarantee is that a joined
/// task's side effects are visible to the caller once the join returns.
pub struct ThreadGroup {
    config: GroupConfig,
    /// Ordered by id, which is also submission order.
    workers: Vec<Worker>,
    outstanding: usize,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
}

impl ThreadGroup {
    /// Creates an empty group with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GroupConfig::default())
    }

    /// Creates an empty group whose threads use `config`.
    pub fn with_config(config: GroupConfig) -> Self {
        let (done_tx, done_rx) = channel::unbounded();
        ThreadGroup {
            config,
            workers: Vec::new(),
            outstanding: 0,
            done_tx,
            done_rx,
        }
    }

    /// Starts `job` on a new thread.
    ///
    /// Never blocks. The closure must own everything it captures.
    pub fn submit<F>(&mut self, job: F) -> Result<WorkerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Task::new(job))
    }

    /// Starts `job` on a new thread, handing it `payload` by value.
    pub fn submit_with<P, F>(&mut self, payload: P, job: F) -> Result<WorkerHandle>
    where
        P: Send + 'static,
        F: FnOnce(P) + Send + 'static,
    {
        self.submit_task(Task::with_payload(payload, job))
    }

    /// Starts a prepared [`Task`] on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadGroupError::Spawn`] if the host cannot create a
    /// thread. No worker is recorded in that case.
    pub fn submit_task(&mut self, task: Task) -> Result<WorkerHandle> {
        let id = WorkerId::next();
        let done_tx = self.done_tx.clone();

        let prefix = &self.config.name_prefix;
        let n = id.as_u64();
        let mut builder = thread::Builder::new().name(format!("{prefix}-{n}"));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let thread = builder.spawn(move || run_worker(id, task, done_tx))?;

        let worker = Worker::new(id, thread);
        let handle = worker.handle();
        self.workers.push(worker);
        self.outstanding += 1;
        debug!("Submitted worker {id}");
        Ok(handle)
    }

    /// Blocks until the worker behind `handle` finishes.
    ///
    /// # Errors
    ///
    /// [`ThreadGroupError::DoubleTermination`] if the worker was already
    /// joined or detached, [`ThreadGroupError::UnknownWorker`] if the
    /// handle came from another group.
    pub fn join(&mut self, handle: WorkerHandle) -> Result<()> {
        let worker = self.worker_mut(&handle)?;
        worker.check_handle(&handle)?;
        worker.join()?;
        self.outstanding -= 1;
        self.drain_completions();
        Ok(())
    }

    /// Lets the worker behind `handle` run on without the group.
    ///
    /// # Errors
    ///
    /// Same as [`ThreadGroup::join`].
    pub fn detach(&mut self, handle: WorkerHandle) -> Result<()> {
        let worker = self.worker_mut(&handle)?;
        worker.check_handle(&handle)?;
        worker.detach()?;
        self.outstanding -= 1;
        self.drain_completions();
        Ok(())
    }

    /// Blocks until every outstanding worker has finished and joins it.
    ///
    /// Returns the number of workers joined by this call; 0 when nothing
    /// was outstanding.
    pub fn join_all(&mut self) -> Result<usize> {
        let mut joined = 0;
        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            worker.join()?;
            self.outstanding -= 1;
            joined += 1;
        }
        self.drain_completions();
        if joined > 0 {
            debug!("Joined {joined} worker(s)");
        }
        Ok(joined)
    }

    /// Like [`ThreadGroup::join_all`], but gives up waiting after `timeout`.
    ///
    /// Workers that finish in time are joined. Tasks are never cancelled.
    /// A timeout too large to form a deadline waits like `join_all`.
    ///
    /// # Errors
    ///
    /// [`ThreadGroupError::JoinInterrupted`] if some workers were still
    /// running at the deadline. They stay outstanding and can be joined by
    /// a later call.
    pub fn join_all_timeout(&mut self, timeout: Duration) -> Result<usize> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.join_all();
        };
        let mut joined = 0;

        loop {
            self.drain_completions();
            for worker in self
                .workers
                .iter_mut()
                .filter(|w| w.is_running() && w.is_finished())
            {
                worker.join()?;
                self.outstanding -= 1;
                joined += 1;
            }

            if self.outstanding == 0 {
                return Ok(joined);
            }

            match self.done_rx.recv_deadline(deadline) {
                Ok(completion) => self.record(completion),
                Err(_) => {
                    let remaining = self.outstanding;
                    warn!("Join interrupted with {remaining} worker(s) still running");
                    return Err(ThreadGroupError::JoinInterrupted { joined, remaining });
                }
            }
        }
    }

    /// Detaches every outstanding worker. Never blocks.
    ///
    /// Detached threads keep running and may outlive the group. Returns the
    /// number of workers detached by this call.
    pub fn detach_all(&mut self) -> usize {
        let mut detached = 0;
        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            if worker.detach().is_ok() {
                self.outstanding -= 1;
                detached += 1;
            }
        }
        if detached > 0 {
            debug!("Detached {detached} worker(s)");
        }
        detached
    }

    /// Number of workers neither joined nor detached.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding
    }

    /// Number of workers ever submitted to this group.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if nothing was ever submitted.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Current state of the worker behind `handle`, or `None` for a
    /// handle from another group.
    pub fn state(&self, handle: &WorkerHandle) -> Option<WorkerState> {
        self.position(handle.id()).map(|i| self.workers[i].state())
    }

    /// Worker ids in submission order.
    pub fn ids(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.workers.iter().map(|w| w.id())
    }

    /// Number of workers known to have panicked.
    ///
    /// Only covers workers whose completion the group has observed.
    pub fn panicked_count(&self) -> usize {
        self.workers.iter().filter(|w| w.panicked()).count()
    }

    /// Consumes the group, reporting outstanding workers as an error.
    ///
    /// # Errors
    ///
    /// [`ThreadGroupError::LeakedWorker`] if any worker was neither joined
    /// nor detached. Those workers are detached before returning.
    pub fn finish(mut self) -> Result<()> {
        let outstanding = self.outstanding;
        if outstanding > 0 {
            self.detach_all();
            return Err(ThreadGroupError::LeakedWorker { outstanding });
        }
        Ok(())
    }

    fn position(&self, id: WorkerId) -> Option<usize> {
        self.workers.binary_search_by_key(&id, |w| w.id()).ok()
    }

    fn worker_mut(&mut self, handle: &WorkerHandle) -> Result<&mut Worker> {
        let id = handle.id();
        match self.position(id) {
            Some(i) => Ok(&mut self.workers[i]),
            None => Err(ThreadGroupError::UnknownWorker { id }),
        }
    }

    fn record(&mut self, completion: Completion) {
        if let Some(i) = self.position(completion.id) {
            self.workers[i].mark_finished(completion.panicked);
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.done_rx.try_recv() {
            self.record(completion);
        }
    }
}

impl Default for ThreadGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        if self.outstanding == 0 {
            return;
        }
        let err = ThreadGroupError::LeakedWorker {
            outstanding: self.outstanding,
        };
        error!("{err}");
        // A second panic while unwinding would abort the process.
        if !thread::panicking() {
            panic!("{err}");
        }
    }
}

/// Body of every worker thread. Returns `true` if the task panicked.
fn run_worker(id: WorkerId, task: Task, done_tx: Sender<Completion>) -> bool {
    debug!("Worker {id} started");
    let panicked = panic::catch_unwind(AssertUnwindSafe(move || task.run())).is_err();
    if panicked {
        error!("Worker {id} task panicked");
    } else {
        debug!("Worker {id} finished");
    }
    // The receiver is gone if the group was dropped after detaching us.
    let _ = done_tx.send(Completion { id, panicked });
    panicked
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn ids_follow_submission_order() {
        let mut group = ThreadGroup::new();
        let a = group.submit(|| {}).unwrap();
        let b = group.submit(|| {}).unwrap();
        let ids: Vec<_> = group.ids().collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
        group.join_all().unwrap();
    }

    #[test]
    fn join_updates_outstanding() {
        let mut group = ThreadGroup::new();
        let handle = group.submit(|| {}).unwrap();
        let _other = group.submit(|| {}).unwrap();
        assert_eq!(group.outstanding_count(), 2);

        group.join(handle).unwrap();
        assert_eq!(group.outstanding_count(), 1);
        assert_eq!(group.join_all().unwrap(), 1);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn foreign_handle_is_unknown() {
        let mut first = ThreadGroup::new();
        let mut second = ThreadGroup::new();
        let handle = first.submit(|| {}).unwrap();
        second.submit(|| {}).unwrap();

        assert_eq!(second.state(&handle), None);
        assert!(matches!(
            second.join(handle),
            Err(ThreadGroupError::UnknownWorker { .. })
        ));
        first.join_all().unwrap();
        second.join_all().unwrap();
    }

    #[test]
    fn completions_are_recorded() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut group = ThreadGroup::new();
        for _ in 0..3 {
            let ran = ran.clone();
            group
                .submit(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(group.join_all_timeout(Duration::from_secs(10)).unwrap(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(group.workers.iter().all(|w| w.is_finished()));
    }

    #[test]
    fn per_handle_join_drains_completions() {
        let mut group = ThreadGroup::new();
        let handles: Vec<_> = (0..3).map(|_| group.submit(|| {}).unwrap()).collect();
        for handle in handles {
            group.join(handle).unwrap();
        }
        assert!(group.done_rx.is_empty());
        assert!(group.workers.iter().all(|w| w.is_finished()));
    }

    #[test]
    fn unbounded_timeout_waits_for_everything() {
        let mut group = ThreadGroup::new();
        group.submit(|| thread::sleep(Duration::from_millis(20))).unwrap();
        group.submit(|| {}).unwrap();
        assert_eq!(group.join_all_timeout(Duration::MAX).unwrap(), 2);
        assert_eq!(group.outstanding_count(), 0);
    }
}
