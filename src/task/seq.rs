use crate::{
    contract::Contract,
    executor::Executor,
    slot::ValueSlot,
    sync::CompletionFlag,
    task::{DRAIN_PARK, InputSource, TaskImpl},
};
use core::marker::PhantomData;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Shared state of an in-flight sequence task.
///
/// The contract of stage `i` takes the slot's value, invokes its stage, and
/// writes the output back to the same slot before handing control to stage
/// `i + 1` via [`stage_finished`](Self::stage_finished). At most one
/// contract of a sequence is runnable at any moment, which is what makes
/// the single shared slot sound.
///
/// Contract bodies reach this state through `Weak` references; the owning
/// [`Task`](crate::task::Task) holds the only strong one, so dropping the
/// task turns any not-yet-run contracts into no-ops.
pub(crate) struct SeqCore {
    pub(crate) slot: ValueSlot,
    pub(crate) contracts: OnceLock<Vec<Contract>>,
    pub(crate) done: CompletionFlag,
    pub(crate) on_complete: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    pub(crate) executor: Executor,
}

impl SeqCore {
    pub(crate) fn new(executor: Executor) -> Self {
        Self {
            slot: ValueSlot::empty(),
            contracts: OnceLock::new(),
            done: CompletionFlag::new(),
            on_complete: Mutex::new(None),
            executor,
        }
    }

    /// Hand control to the next stage, or complete the task after the last.
    pub(crate) fn stage_finished(&self, index: usize) {
        let contracts = self
            .contracts
            .get()
            .expect("SeqCore::stage_finished: [1]");
        match contracts.get(index + 1) {
            Some(next) => next.schedule(),
            None => {
                if let Some(callback) = self.on_complete.lock().take() {
                    callback();
                }
                self.done.set();
            }
        }
    }
}

/// Task backend for [`Sequence`](crate::compose::Sequence) compositions.
pub(crate) struct SeqTaskImpl<I, O> {
    core: Arc<SeqCore>,
    input: InputSource<I>,
    _output: PhantomData<fn() -> O>,
}

impl<I, O> SeqTaskImpl<I, O> {
    pub(crate) fn new(core: Arc<SeqCore>, input: InputSource<I>) -> Self {
        Self {
            core,
            input,
            _output: PhantomData,
        }
    }
}

impl<I, O> TaskImpl<O> for SeqTaskImpl<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn schedule(&mut self) {
        let input = self.input.resolve();
        // SAFETY: The task is not yet scheduled, so no contract can touch
        // the slot; the send performed by `Contract::schedule` below orders
        // this write before the first stage's read.
        unsafe { self.core.slot.store(input) };
        self.core
            .contracts
            .get()
            .expect("SeqTaskImpl::schedule: [1]")
            .first()
            .expect("SeqTaskImpl::schedule: [2]")
            .schedule();
    }

    fn wait(&mut self) {
        self.core.done.wait();
    }

    fn wait_draining(&mut self) {
        while !self.core.done.is_set() {
            if !self.core.executor.contract_group().try_execute_next() {
                self.core.done.wait_timeout(DRAIN_PARK);
            }
        }
    }

    fn take_result(&mut self) -> O {
        // SAFETY: Completion was observed through the flag, whose lock
        // orders the final stage's write before this read, and no contract
        // of this task remains runnable.
        unsafe { self.core.slot.take::<O>() }
    }

    fn set_on_complete(&mut self, callback: Box<dyn FnOnce() + Send>) {
        *self.core.on_complete.lock() = Some(callback);
    }
}
