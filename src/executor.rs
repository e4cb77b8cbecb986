use crate::{
    compose::Composition,
    contract::{ContractGroup, Job},
    error::ExecutorError,
    task::Task,
};
use core::num::NonZeroUsize;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, trace};

/// Default upper bound on the worker pool size.
pub const MAX_THREAD_COUNT: usize = 256;

const DEFAULT_THREAD_NAME_PREFIX: &str = "stagepool-worker";

/// Handle to a pool of worker threads draining one shared [`ContractGroup`].
///
/// The executor is the only deliberately shared piece of the crate.
/// Compositions stay stateless and tasks stay single-use; every contract
/// they produce funnels into this one queue so that unrelated pipelines
/// load-balance across a common pool. It is an explicit value rather than
/// process-global state; construct one at startup and pass clones wherever
/// pipelines are applied.
///
/// Cloning is cheap and every clone drives the same pool. Live tasks hold a
/// handle too, so the pool outlives the user's handles for as long as work
/// is in flight; the workers are signalled to stop and joined when the last
/// handle drops.
///
/// ```
/// use stagepool::{Executor, Sequence};
///
/// # fn main() -> Result<(), stagepool::ExecutorError> {
/// let executor = Executor::builder().thread_count(2).build()?;
/// let double_then_inc = Sequence::new((|x: i32| x * 2, |x: i32| x + 1));
/// let mut task = executor.apply(&double_then_inc, 20);
/// task.execute();
/// assert_eq!(task.result(), 41);
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Clone, Debug)]
pub struct Executor {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    group: ContractGroup,
    pool: Mutex<WorkerPool>,
    /// Serializes whole resize operations; `pool` is never held across a
    /// join.
    resize_lock: Mutex<()>,
    max_thread_count: usize,
    thread_name_prefix: String,
}

#[derive(Debug, Default)]
struct WorkerPool {
    workers: Vec<Worker>,
    next_worker_id: u64,
}

#[derive(Debug)]
struct Worker {
    /// Closing this channel is the worker's stop signal.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Executor {
    /// Create an executor with the default configuration (one worker per
    /// available hardware thread).
    ///
    /// # Errors
    ///
    /// If the OS refuses to spawn a worker thread.
    pub fn new() -> Result<Self, ExecutorError> {
        Self::builder().build()
    }

    /// Start configuring an executor.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// Instantiate `composition` into a task over `input`.
    ///
    /// The task is fully wired but idle; nothing runs until
    /// [`Task::schedule`](crate::task::Task::schedule) or
    /// [`Task::execute`](crate::task::Task::execute) is called on it.
    pub fn apply<C: Composition>(&self, composition: &C, input: C::Input) -> Task<C::Output> {
        composition.instantiate(self, input)
    }

    /// Instantiate `composition` into a task whose input is produced by
    /// `getter`, invoked exactly once when the task is scheduled.
    ///
    /// This lets one task's still-pending result feed another without
    /// forcing an evaluation order at composition time: the getter typically
    /// waits on the upstream task and extracts its result.
    pub fn apply_deferred<C: Composition>(
        &self,
        composition: &C,
        getter: impl FnOnce() -> C::Input + Send + 'static,
    ) -> Task<C::Output> {
        composition.instantiate_deferred(self, Box::new(getter))
    }

    /// The contract group shared by every task on this executor.
    pub fn contract_group(&self) -> &ContractGroup {
        &self.shared.group
    }

    /// Current number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.shared.pool.lock().workers.len()
    }

    /// Resize the worker pool to exactly `count` threads.
    ///
    /// Growing spawns new workers; shrinking signals the excess workers to
    /// stop and joins them, which waits for their in-flight contract bodies
    /// to finish. Resizes are serialized by a dedicated lock, and the pool
    /// lock is released before any join, so stages that call
    /// [`thread_count`](Self::thread_count) keep running while a shrink
    /// drains. Contracts already scheduled are unaffected either way: the
    /// surviving workers keep draining the shared group, so no contract is
    /// dropped or run twice.
    ///
    /// # Errors
    ///
    /// If the OS refuses to spawn a worker thread while growing. Workers
    /// spawned before the failure stay in the pool.
    ///
    /// Resizing from inside a stage body is not supported: a shrink panics
    /// (the calling worker cannot join itself), and any resize may block
    /// behind one that is draining the caller's own worker.
    ///
    /// # Panics
    ///
    /// If `count` is zero or exceeds the configured maximum, or if a shrink
    /// is requested from inside a stage body.
    pub fn set_thread_count(&self, count: usize) -> Result<(), ExecutorError> {
        assert!(count >= 1, "worker pool cannot be resized below one thread");
        assert!(
            count <= self.shared.max_thread_count,
            "worker pool cannot exceed {} threads",
            self.shared.max_thread_count,
        );
        self.shared.resize(count)
    }
}

impl Shared {
    fn resize(&self, count: usize) -> Result<(), ExecutorError> {
        // A whole resize is serialized by its own lock. The pool lock is
        // held only to edit the worker list, never across a join, so a
        // stage body reading the pool size does not block a shrink that is
        // waiting for its worker to finish.
        let _serialize = self.resize_lock.lock();
        let mut pool = self.pool.lock();
        let current = pool.workers.len();
        if current != count {
            debug!(from = current, to = count, "resizing worker pool");
        }
        while pool.workers.len() < count {
            let worker = self.spawn_worker(pool.next_worker_id)?;
            pool.next_worker_id += 1;
            pool.workers.push(worker);
        }
        let excess = if pool.workers.len() > count {
            pool.workers.split_off(count)
        } else {
            Vec::new()
        };
        drop(pool);
        // Close every stop channel first so the excess workers wind down
        // in parallel rather than one join at a time.
        let handles: Vec<_> = excess
            .into_iter()
            .map(|Worker { stop, handle }| {
                drop(stop);
                handle
            })
            .collect();
        for handle in handles {
            assert!(
                handle.thread().id() != thread::current().id(),
                "worker pool cannot be shrunk from inside a stage body"
            );
            if handle.join().is_err() {
                panic!("worker thread panicked in a contract body");
            }
        }
        Ok(())
    }

    fn spawn_worker(&self, id: u64) -> Result<Worker, ExecutorError> {
        let (stop, stop_rx) = crossbeam_channel::bounded(0);
        let jobs = self.group.job_receiver();
        let handle = thread::Builder::new()
            .name(format!("{}-{id}", self.thread_name_prefix))
            .spawn(move || worker_loop(&jobs, &stop_rx))
            .map_err(|source| ExecutorError::SpawnWorker { source })?;
        Ok(Worker { stop, handle })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let workers = core::mem::take(&mut self.pool.get_mut().workers);
        if workers.is_empty() {
            return;
        }
        debug!(count = workers.len(), "shutting down worker pool");
        let handles: Vec<_> = workers
            .into_iter()
            .map(|Worker { stop, handle }| {
                drop(stop);
                handle
            })
            .collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                // The last handle can be dropped from inside a worker when a
                // task outlives every user-held clone. That thread is already
                // winding down and cannot join itself.
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn worker_loop(jobs: &Receiver<Job>, stop: &Receiver<()>) {
    trace!("worker thread started");
    loop {
        crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => job(),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    trace!("worker thread stopped");
}

/// Configuration for an [`Executor`].
///
/// ```
/// use stagepool::Executor;
///
/// # fn main() -> Result<(), stagepool::ExecutorError> {
/// let executor = Executor::builder()
///     .thread_count(4)
///     .thread_name_prefix("render")
///     .build()?;
/// assert_eq!(executor.thread_count(), 4);
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Clone, Debug)]
pub struct ExecutorBuilder {
    thread_count: Option<usize>,
    max_thread_count: usize,
    thread_name_prefix: String,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            thread_count: None,
            max_thread_count: MAX_THREAD_COUNT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
        }
    }
}

impl ExecutorBuilder {
    /// Initial number of worker threads. Defaults to the host's available
    /// hardware concurrency.
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    /// Upper bound the pool may later be resized to. Defaults to
    /// [`MAX_THREAD_COUNT`].
    pub fn max_thread_count(mut self, max: usize) -> Self {
        self.max_thread_count = max;
        self
    }

    /// Prefix for worker thread names; the worker id is appended.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Spawn the workers and return the executor handle.
    ///
    /// # Errors
    ///
    /// If the OS refuses to spawn a worker thread.
    ///
    /// # Panics
    ///
    /// If the configured thread count is zero or exceeds the maximum.
    pub fn build(self) -> Result<Executor, ExecutorError> {
        let Self {
            thread_count,
            max_thread_count,
            thread_name_prefix,
        } = self;
        let thread_count = thread_count.unwrap_or_else(default_thread_count);
        let executor = Executor {
            shared: Arc::new(Shared {
                group: ContractGroup::new(),
                pool: Mutex::new(WorkerPool::default()),
                resize_lock: Mutex::new(()),
                max_thread_count,
                thread_name_prefix,
            }),
        };
        debug!(threads = thread_count, "starting executor");
        executor.set_thread_count(thread_count)?;
        Ok(executor)
    }
}

fn default_thread_count() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::Executor;
    use core::time::Duration;

    #[test]
    fn default_builder_uses_hardware_concurrency() {
        let executor = Executor::new().expect("executor should start");
        assert!(executor.thread_count() >= 1);
    }

    #[test]
    fn workers_drain_scheduled_contracts() {
        let executor = Executor::builder()
            .thread_count(1)
            .build()
            .expect("executor should start");
        let (tx, rx) = crossbeam_channel::bounded(1);
        let contract = executor.contract_group().create_contract(move || {
            tx.send(42).expect("test receiver alive");
        });
        contract.schedule();
        let value = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("a worker should run the contract");
        assert_eq!(value, 42);
    }

    #[test]
    fn clones_share_one_pool() {
        let executor = Executor::builder()
            .thread_count(2)
            .build()
            .expect("executor should start");
        let clone = executor.clone();
        assert_eq!(clone.thread_count(), 2);
        executor
            .set_thread_count(3)
            .expect("growing the pool should succeed");
        assert_eq!(clone.thread_count(), 3);
    }
}
