//! Tuple impls wiring compositions of arity 1 through 12 into tasks.
//!
//! Everything here is generated per arity by `impl_stage_tuples!`: the list
//! markers, the `IntoStage`-tuple conversions, and the `Composition` impls
//! that create one contract per stage and hand the result to the matching
//! task backend. Pipelines longer than the arity ceiling nest a composition
//! as a stage of another.

use super::{
    Composition, IntoParallelList, IntoSequenceList, Parallel, ParallelList, Sequence,
    SequenceList, sealed,
};
use crate::{
    executor::Executor,
    slot::ValueSlot,
    stage::{ChainsAfter, IntoStage, Stage},
    task::{
        InputSource, Task,
        par::{ParCore, ParTaskImpl},
        seq::{SeqCore, SeqTaskImpl},
    },
};
use std::sync::Arc;

macro_rules! impl_stage_tuples {
    (
        len = $len:expr,
        stages = [$(($S:ident, $T:ident, $M:ident, $idx:tt)),+ $(,)?],
        chain = [$(($Prev:ident, $Next:ident)),* $(,)?],
        first = $First:ident,
        last = $Last:ident $(,)?
    ) => {
        impl<$($S),+> sealed::Sealed for ($($S,)+) {}

        impl<$($S),+> SequenceList for ($($S,)+)
        where
            $First: Stage,
            $($Next: ChainsAfter<$Prev>,)*
        {
            type Input = <$First as Stage>::Input;
            type Output = <$Last as Stage>::Output;
            const LEN: usize = $len;
        }

        impl<$($S),+> ParallelList for ($($S,)+)
        where
            $($S: Stage,)+
        {
            type Input = ($(<$S as Stage>::Input,)+);
            type Output = ($(<$S as Stage>::Output,)+);
            const LEN: usize = $len;
        }

        impl<$($T, $M),+> IntoSequenceList<($($M,)+)> for ($($T,)+)
        where
            $($T: IntoStage<$M>,)+
            ($(<$T as IntoStage<$M>>::Stage,)+): SequenceList,
        {
            type List = ($(<$T as IntoStage<$M>>::Stage,)+);

            fn into_list(self) -> Self::List {
                ($(self.$idx.into_stage(),)+)
            }
        }

        impl<$($T, $M),+> IntoParallelList<($($M,)+)> for ($($T,)+)
        where
            $($T: IntoStage<$M>,)+
            ($(<$T as IntoStage<$M>>::Stage,)+): ParallelList,
        {
            type List = ($(<$T as IntoStage<$M>>::Stage,)+);

            fn into_list(self) -> Self::List {
                ($(self.$idx.into_stage(),)+)
            }
        }

        impl<$($S),+> Sequence<($($S,)+)>
        where
            $First: Stage,
            $($Next: ChainsAfter<$Prev>,)*
        {
            fn build_task(
                &self,
                executor: &Executor,
                input: InputSource<<$First as Stage>::Input>,
            ) -> Task<<$Last as Stage>::Output> {
                let core = Arc::new(SeqCore::new(executor.clone()));
                let group = executor.contract_group();
                let mut contracts = Vec::with_capacity($len);
                $(
                    {
                        let stages = Arc::clone(&self.stages);
                        let core = Arc::downgrade(&core);
                        contracts.push(group.create_contract(move || {
                            let Some(core) = core.upgrade() else {
                                // The task was dropped before this stage ran.
                                return;
                            };
                            // SAFETY: At most one contract of a sequence is in
                            // flight, and the schedule that enqueued this one
                            // orders the previous write before this read.
                            let input =
                                unsafe { core.slot.take::<<$S as Stage>::Input>() };
                            let output = stages.$idx.invoke(&core.executor, input);
                            // SAFETY: Same exclusivity; the next contract (or
                            // the waiting caller) only runs after the hand-off
                            // below.
                            unsafe { core.slot.store(output) };
                            core.stage_finished($idx);
                        }));
                    }
                )+
                assert!(
                    core.contracts.set(contracts).is_ok(),
                    "Sequence::build_task: [1]"
                );
                Task::from_impl(Box::new(SeqTaskImpl::<_, <$Last as Stage>::Output>::new(
                    core, input,
                )))
            }
        }

        impl<$($S),+> Composition for Sequence<($($S,)+)>
        where
            $First: Stage,
            $($Next: ChainsAfter<$Prev>,)*
        {
            type Input = <$First as Stage>::Input;
            type Output = <$Last as Stage>::Output;

            fn instantiate(
                &self,
                executor: &Executor,
                input: Self::Input,
            ) -> Task<Self::Output> {
                self.build_task(executor, InputSource::Value(input))
            }

            fn instantiate_deferred(
                &self,
                executor: &Executor,
                getter: Box<dyn FnOnce() -> Self::Input + Send>,
            ) -> Task<Self::Output> {
                self.build_task(executor, InputSource::Deferred(getter))
            }
        }

        impl<$($S),+> Parallel<($($S,)+)>
        where
            $($S: Stage,)+
        {
            fn build_task(
                &self,
                executor: &Executor,
                input: InputSource<($(<$S as Stage>::Input,)+)>,
            ) -> Task<($(<$S as Stage>::Output,)+)> {
                let core = Arc::new(ParCore::new(executor.clone(), $len));
                let group = executor.contract_group();
                let mut contracts = Vec::with_capacity($len);
                $(
                    {
                        let stages = Arc::clone(&self.stages);
                        let core = Arc::downgrade(&core);
                        contracts.push(group.create_contract(move || {
                            let Some(core) = core.upgrade() else {
                                // The task was dropped before this branch ran.
                                return;
                            };
                            // SAFETY: This branch's slots belong to this
                            // contract alone, and the schedule that enqueued
                            // it orders the scatter write before this read.
                            let input = unsafe {
                                core.branch_inputs[$idx].take::<<$S as Stage>::Input>()
                            };
                            let output = stages.$idx.invoke(&core.executor, input);
                            // SAFETY: Exclusive to this branch; the arrival
                            // below orders the write before the join's reads.
                            unsafe { core.branch_outputs[$idx].store(output) };
                            core.barrier.arrive();
                        }));
                    }
                )+
                assert!(
                    core.contracts.set(contracts).is_ok(),
                    "Parallel::build_task: [1]"
                );
                let scatter: fn(($(<$S as Stage>::Input,)+), &[ValueSlot]) = |input, slots| {
                    assert_eq!(slots.len(), $len, "Parallel::scatter: [1]");
                    // SAFETY: Runs before any contract of the task is
                    // scheduled, and the schedule sends order these writes
                    // before the branch reads.
                    $(unsafe { slots[$idx].store(input.$idx) };)+
                };
                let gather: fn(&[ValueSlot]) -> ($(<$S as Stage>::Output,)+) = |slots| {
                    assert_eq!(slots.len(), $len, "Parallel::gather: [1]");
                    // SAFETY: Runs only after the barrier released, which
                    // orders every branch's write before these reads, with no
                    // contract of the task left runnable.
                    ($(unsafe { slots[$idx].take::<<$S as Stage>::Output>() },)+)
                };
                Task::from_impl(Box::new(ParTaskImpl::new(core, input, scatter, gather)))
            }
        }

        impl<$($S),+> Composition for Parallel<($($S,)+)>
        where
            $($S: Stage,)+
        {
            type Input = ($(<$S as Stage>::Input,)+);
            type Output = ($(<$S as Stage>::Output,)+);

            fn instantiate(
                &self,
                executor: &Executor,
                input: Self::Input,
            ) -> Task<Self::Output> {
                self.build_task(executor, InputSource::Value(input))
            }

            fn instantiate_deferred(
                &self,
                executor: &Executor,
                getter: Box<dyn FnOnce() -> Self::Input + Send>,
            ) -> Task<Self::Output> {
                self.build_task(executor, InputSource::Deferred(getter))
            }
        }
    };
}

impl_stage_tuples!(
    len = 1,
    stages = [(S0, T0, M0, 0)],
    chain = [],
    first = S0,
    last = S0,
);
impl_stage_tuples!(
    len = 2,
    stages = [(S0, T0, M0, 0), (S1, T1, M1, 1)],
    chain = [(S0, S1)],
    first = S0,
    last = S1,
);
impl_stage_tuples!(
    len = 3,
    stages = [(S0, T0, M0, 0), (S1, T1, M1, 1), (S2, T2, M2, 2)],
    chain = [(S0, S1), (S1, S2)],
    first = S0,
    last = S2,
);
impl_stage_tuples!(
    len = 4,
    stages = [(S0, T0, M0, 0), (S1, T1, M1, 1), (S2, T2, M2, 2), (S3, T3, M3, 3)],
    chain = [(S0, S1), (S1, S2), (S2, S3)],
    first = S0,
    last = S3,
);
impl_stage_tuples!(
    len = 5,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4)
    ],
    chain = [(S0, S1), (S1, S2), (S2, S3), (S3, S4)],
    first = S0,
    last = S4,
);
impl_stage_tuples!(
    len = 6,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5)
    ],
    chain = [(S0, S1), (S1, S2), (S2, S3), (S3, S4), (S4, S5)],
    first = S0,
    last = S5,
);
impl_stage_tuples!(
    len = 7,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6)
    ],
    chain = [(S0, S1), (S1, S2), (S2, S3), (S3, S4), (S4, S5), (S5, S6)],
    first = S0,
    last = S6,
);
impl_stage_tuples!(
    len = 8,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6),
        (S7, T7, M7, 7)
    ],
    chain = [(S0, S1), (S1, S2), (S2, S3), (S3, S4), (S4, S5), (S5, S6), (S6, S7)],
    first = S0,
    last = S7,
);
impl_stage_tuples!(
    len = 9,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6),
        (S7, T7, M7, 7),
        (S8, T8, M8, 8)
    ],
    chain = [
        (S0, S1),
        (S1, S2),
        (S2, S3),
        (S3, S4),
        (S4, S5),
        (S5, S6),
        (S6, S7),
        (S7, S8)
    ],
    first = S0,
    last = S8,
);
impl_stage_tuples!(
    len = 10,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6),
        (S7, T7, M7, 7),
        (S8, T8, M8, 8),
        (S9, T9, M9, 9)
    ],
    chain = [
        (S0, S1),
        (S1, S2),
        (S2, S3),
        (S3, S4),
        (S4, S5),
        (S5, S6),
        (S6, S7),
        (S7, S8),
        (S8, S9)
    ],
    first = S0,
    last = S9,
);
impl_stage_tuples!(
    len = 11,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6),
        (S7, T7, M7, 7),
        (S8, T8, M8, 8),
        (S9, T9, M9, 9),
        (S10, T10, M10, 10)
    ],
    chain = [
        (S0, S1),
        (S1, S2),
        (S2, S3),
        (S3, S4),
        (S4, S5),
        (S5, S6),
        (S6, S7),
        (S7, S8),
        (S8, S9),
        (S9, S10)
    ],
    first = S0,
    last = S10,
);
impl_stage_tuples!(
    len = 12,
    stages = [
        (S0, T0, M0, 0),
        (S1, T1, M1, 1),
        (S2, T2, M2, 2),
        (S3, T3, M3, 3),
        (S4, T4, M4, 4),
        (S5, T5, M5, 5),
        (S6, T6, M6, 6),
        (S7, T7, M7, 7),
        (S8, T8, M8, 8),
        (S9, T9, M9, 9),
        (S10, T10, M10, 10),
        (S11, T11, M11, 11)
    ],
    chain = [
        (S0, S1),
        (S1, S2),
        (S2, S3),
        (S3, S4),
        (S4, S5),
        (S5, S6),
        (S6, S7),
        (S7, S8),
        (S8, S9),
        (S9, S10),
        (S10, S11)
    ],
    first = S0,
    last = S11,
);
