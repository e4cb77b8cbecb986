pub(crate) mod par;
pub(crate) mod seq;

use core::time::Duration;
use derive_more::Debug;

/// How long a draining wait parks between queue polls.
const DRAIN_PARK: Duration = Duration::from_micros(100);

/// How far through its lifecycle a task has moved.
///
/// Tasks advance monotonically and are single-use; moving backwards or
/// skipping a step is a usage error and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Constructed,
    Scheduled,
    Complete,
}

/// A single-use execution instance of a composition.
///
/// Created by [`Executor::apply`](crate::executor::Executor::apply), which
/// binds a stateless composition to one input value and wires one contract
/// per stage. The task then moves through its lifecycle exactly once:
/// [`schedule`](Self::schedule) enqueues it, [`wait`](Self::wait) blocks
/// until every contract has run, and [`result`](Self::result) consumes the
/// task and moves the final value out. Re-running requires applying the
/// composition again.
///
/// Dropping a task mid-flight is safe: contracts that have not yet run
/// become no-ops, and in-flight stage work keeps its state alive until it
/// finishes.
///
/// Stage bodies are not supervised. A stage that panics unwinds the worker
/// thread running it and abandons the task, so a waiter on such a task
/// never wakes.
#[must_use = "a task does nothing until scheduled"]
#[derive(Debug)]
pub struct Task<R> {
    #[debug(skip)]
    imp: Box<dyn TaskImpl<R>>,
    state: TaskState,
}

impl<R> Task<R> {
    pub(crate) fn from_impl(imp: Box<dyn TaskImpl<R>>) -> Self {
        Self {
            imp,
            state: TaskState::Constructed,
        }
    }

    /// Enqueue the task's first contract (sequences) or all of its branch
    /// contracts (parallels), invoking the deferred input getter if one was
    /// given.
    ///
    /// Returns `&mut Self` so `schedule().wait()` chains.
    ///
    /// # Panics
    ///
    /// If the task was already scheduled.
    pub fn schedule(&mut self) -> &mut Self {
        assert_eq!(
            self.state,
            TaskState::Constructed,
            "task has already been scheduled"
        );
        self.imp.schedule();
        self.state = TaskState::Scheduled;
        self
    }

    /// Block the calling thread until every contract of the task has run.
    ///
    /// Waiting again after completion returns immediately.
    ///
    /// # Panics
    ///
    /// If the task has not been scheduled.
    pub fn wait(&mut self) -> &mut Self {
        match self.state {
            TaskState::Constructed => panic!("task must be scheduled before wait()"),
            TaskState::Scheduled => {
                self.imp.wait();
                self.state = TaskState::Complete;
            }
            TaskState::Complete => {}
        }
        self
    }

    /// [`schedule`](Self::schedule) followed by [`wait`](Self::wait).
    pub fn execute(&mut self) -> &mut Self {
        self.schedule().wait()
    }

    /// Move the final value out of the task.
    ///
    /// Consumes the task, so a result cannot be extracted twice.
    ///
    /// # Panics
    ///
    /// If the task has not completed. Schedule it and wait first.
    pub fn result(mut self) -> R {
        assert_eq!(
            self.state,
            TaskState::Complete,
            "task result requested before completion"
        );
        self.imp.take_result()
    }

    /// Register a callback run exactly once when the task completes: after
    /// the last stage of a sequence, or at the join barrier's final arrival
    /// for a parallel. No ordering is guaranteed between the callback and a
    /// waiting caller's wake-up.
    ///
    /// # Panics
    ///
    /// If the task was already scheduled.
    pub fn on_complete(&mut self, callback: impl FnOnce() + Send + 'static) -> &mut Self {
        assert_eq!(
            self.state,
            TaskState::Constructed,
            "completion callbacks must be registered before scheduling"
        );
        self.imp.set_on_complete(Box::new(callback));
        self
    }

    /// Run to completion while draining the shared group on this thread.
    ///
    /// This is how a stage body awaits a nested composition without parking
    /// its worker: were the worker to block, a pool of size one could never
    /// run the child's contracts.
    pub(crate) fn execute_draining(&mut self) {
        assert_eq!(
            self.state,
            TaskState::Constructed,
            "Task::execute_draining: [1]"
        );
        self.imp.schedule();
        self.state = TaskState::Scheduled;
        self.imp.wait_draining();
        self.state = TaskState::Complete;
    }
}

/// Object-safe backend of [`Task`], implemented per composition kind.
///
/// The [`Task`] facade owns the lifecycle bookkeeping; implementations only
/// provide the mechanics and may assume calls arrive in lifecycle order.
pub(crate) trait TaskImpl<R>: Send {
    /// Enqueue the task's initial contract(s), resolving the input source.
    fn schedule(&mut self);
    /// Park until the task completes.
    fn wait(&mut self);
    /// Wait for completion while running queued contracts on this thread.
    fn wait_draining(&mut self);
    /// Move the final value out. Called at most once, after completion.
    fn take_result(&mut self) -> R;
    /// Install the completion callback. Called before scheduling.
    fn set_on_complete(&mut self, callback: Box<dyn FnOnce() + Send>);
}

/// Where a task's input value comes from at schedule time.
pub(crate) enum InputSource<I> {
    /// Supplied up front.
    Value(I),
    /// Produced by a getter invoked exactly once at schedule time.
    Deferred(Box<dyn FnOnce() -> I + Send>),
    /// Already moved into the pipeline.
    Resolved,
}

impl<I> InputSource<I> {
    /// Move the input out, invoking the deferred getter if one was given.
    pub(crate) fn resolve(&mut self) -> I {
        match core::mem::replace(self, Self::Resolved) {
            Self::Value(value) => value,
            Self::Deferred(getter) => getter(),
            Self::Resolved => unreachable!("InputSource::resolve"),
        }
    }
}
