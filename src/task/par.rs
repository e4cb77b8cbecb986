use crate::{
    contract::Contract,
    executor::Executor,
    slot::ValueSlot,
    sync::JoinBarrier,
    task::{DRAIN_PARK, InputSource, TaskImpl},
};
use std::sync::{Arc, OnceLock};

/// Shared state of an in-flight parallel task.
///
/// Each branch owns one input and one output slot at its own index, so
/// branches never contend; the only cross-branch structure is the join
/// barrier, sized to the branch count plus one for the waiting caller.
///
/// Contract bodies reach this state through `Weak` references, mirroring
/// [`SeqCore`](crate::task::seq::SeqCore).
pub(crate) struct ParCore {
    pub(crate) branch_inputs: Vec<ValueSlot>,
    pub(crate) branch_outputs: Vec<ValueSlot>,
    pub(crate) contracts: OnceLock<Vec<Contract>>,
    pub(crate) barrier: JoinBarrier,
    pub(crate) executor: Executor,
}

impl ParCore {
    pub(crate) fn new(executor: Executor, branches: usize) -> Self {
        Self {
            branch_inputs: (0..branches).map(|_| ValueSlot::empty()).collect(),
            branch_outputs: (0..branches).map(|_| ValueSlot::empty()).collect(),
            contracts: OnceLock::new(),
            // One arrival per branch plus the caller's wait.
            barrier: JoinBarrier::new(branches + 1),
            executor,
        }
    }
}

/// Task backend for [`Parallel`](crate::compose::Parallel) compositions.
///
/// The scatter and gather functions are monomorphized per stage tuple and
/// move the input tuple's components into the branch input slots and the
/// branch outputs back into the result tuple, preserving positions.
pub(crate) struct ParTaskImpl<I, O> {
    core: Arc<ParCore>,
    input: InputSource<I>,
    scatter: fn(I, &[ValueSlot]),
    gather: fn(&[ValueSlot]) -> O,
}

impl<I, O> ParTaskImpl<I, O> {
    pub(crate) fn new(
        core: Arc<ParCore>,
        input: InputSource<I>,
        scatter: fn(I, &[ValueSlot]),
        gather: fn(&[ValueSlot]) -> O,
    ) -> Self {
        Self {
            core,
            input,
            scatter,
            gather,
        }
    }
}

impl<I, O> TaskImpl<O> for ParTaskImpl<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn schedule(&mut self) {
        let input = self.input.resolve();
        (self.scatter)(input, &self.core.branch_inputs);
        let contracts = self
            .core
            .contracts
            .get()
            .expect("ParTaskImpl::schedule: [1]");
        for contract in contracts {
            contract.schedule();
        }
    }

    fn wait(&mut self) {
        // Reached at most once per task; this is the caller arrival the
        // barrier was sized for. A second call would trip the barrier's
        // arrival-count assert.
        self.core.barrier.arrive_and_wait();
    }

    fn wait_draining(&mut self) {
        self.core.barrier.arrive();
        while !self.core.barrier.is_released() {
            if !self.core.executor.contract_group().try_execute_next() {
                self.core.barrier.wait_released_timeout(DRAIN_PARK);
            }
        }
    }

    fn take_result(&mut self) -> O {
        (self.gather)(&self.core.branch_outputs)
    }

    fn set_on_complete(&mut self, callback: Box<dyn FnOnce() + Send>) {
        self.core.barrier.set_on_complete(callback);
    }
}
