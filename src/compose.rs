mod tuples;

use crate::{executor::Executor, stage::Stage, task::Task};
use core::fmt;
use std::sync::Arc;

/// Tuple of stages forming a type-chained sequence.
///
/// Implemented for stage tuples of arity 1 through 12 whose adjacent
/// output/input types line up (see
/// [`ChainsAfter`](crate::stage::ChainsAfter)); longer pipelines nest a
/// sequence as a stage of another. Sealed: the wiring protocol between
/// compositions and tasks is internal.
pub trait SequenceList: sealed::Sealed + Send + Sync + 'static {
    /// Input of the first stage.
    type Input: Send + 'static;
    /// Output of the last stage.
    type Output: Send + 'static;
    /// Number of stages.
    const LEN: usize;
}

/// Tuple of independent stages forming a parallel fan-out.
///
/// Implemented for stage tuples of arity 1 through 12. Sealed for the same
/// reason as [`SequenceList`].
pub trait ParallelList: sealed::Sealed + Send + Sync + 'static {
    /// Tuple of branch inputs, in declaration order.
    type Input: Send + 'static;
    /// Tuple of branch outputs, in declaration order.
    type Output: Send + 'static;
    /// Number of branches.
    const LEN: usize;
}

/// Conversion from a tuple of stage-convertible values into a validated
/// sequence tuple. The marker parameter is always inferred.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid stage tuple for `Sequence`",
    note = "pass a tuple `(s1, s2, ...)` of up to 12 chained stages; a single stage still needs a 1-tuple `(s,)`"
)]
pub trait IntoSequenceList<Marker>: sealed::Sealed {
    /// The validated stage tuple.
    type List: SequenceList;

    #[doc(hidden)]
    fn into_list(self) -> Self::List;
}

/// Conversion from a tuple of stage-convertible values into a validated
/// parallel tuple. The marker parameter is always inferred.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid stage tuple for `Parallel`",
    note = "pass a tuple `(s1, s2, ...)` of up to 12 independent stages; a single branch still needs a 1-tuple `(s,)`"
)]
pub trait IntoParallelList<Marker>: sealed::Sealed {
    /// The validated stage tuple.
    type List: ParallelList;

    #[doc(hidden)]
    fn into_list(self) -> Self::List;
}

/// Ordered, type-chained composition of stages.
///
/// A sequence is a stateless description: building one allocates the stage
/// tuple once behind an `Arc` and performs no execution. Adjacent stages
/// are checked at compile time, so an ill-typed chain never constructs.
/// Apply it to an input with
/// [`Executor::apply`](crate::executor::Executor::apply) to obtain a
/// runnable [`Task`], as many times as needed.
///
/// Cloning is cheap and shares the stage storage, and a sequence is itself
/// a [`Stage`], so it can appear inside other compositions while remaining
/// independently applicable.
///
/// ```
/// use stagepool::{Executor, Sequence};
///
/// # fn main() -> Result<(), stagepool::ExecutorError> {
/// let executor = Executor::builder().thread_count(2).build()?;
/// let shout = Sequence::new((
///     |name: String| name.to_uppercase(),
///     |name: String| format!("{name}!"),
/// ));
/// let mut task = executor.apply(&shout, "stagepool".to_string());
/// task.execute();
/// assert_eq!(task.result(), "STAGEPOOL!");
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Sequence<L: SequenceList> {
    stages: Arc<L>,
}

impl<L: SequenceList> Sequence<L> {
    /// Build a sequence from a tuple of stages (closures, function pointers,
    /// compositions, or `Arc`s of stages), checking at compile time that
    /// every adjacent output/input pair lines up.
    pub fn new<T, M>(stages: T) -> Self
    where
        T: IntoSequenceList<M, List = L>,
    {
        Self {
            stages: Arc::new(stages.into_list()),
        }
    }

    /// Number of stages.
    pub fn stage_count(&self) -> usize {
        L::LEN
    }
}

impl<L: SequenceList> Clone for Sequence<L> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<L: SequenceList> fmt::Debug for Sequence<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").field("stages", &L::LEN).finish()
    }
}

/// Concurrent fan-out composition over a tuple of independent stages.
///
/// A parallel consumes a tuple with one component per branch, hands each
/// component to its stage positionally, and produces the tuple of branch
/// outputs in declaration order regardless of which branch finishes first.
/// Branches are unrelated in type and run as independent contracts.
///
/// Like [`Sequence`], a parallel is a cheaply clonable, stateless
/// description and is itself a [`Stage`].
///
/// ```
/// use stagepool::{Executor, Parallel};
///
/// # fn main() -> Result<(), stagepool::ExecutorError> {
/// let executor = Executor::builder().thread_count(2).build()?;
/// let branches = Parallel::new((|x: i32| x + 1, |s: String| s.len()));
/// let mut task = executor.apply(&branches, (41, "four".to_string()));
/// task.execute();
/// assert_eq!(task.result(), (42, 4));
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Parallel<L: ParallelList> {
    stages: Arc<L>,
}

impl<L: ParallelList> Parallel<L> {
    /// Build a parallel from a tuple of independent stages, one per branch.
    pub fn new<T, M>(stages: T) -> Self
    where
        T: IntoParallelList<M, List = L>,
    {
        Self {
            stages: Arc::new(stages.into_list()),
        }
    }

    /// Number of branches.
    pub fn branch_count(&self) -> usize {
        L::LEN
    }
}

impl<L: ParallelList> Clone for Parallel<L> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<L: ParallelList> fmt::Debug for Parallel<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parallel")
            .field("branches", &L::LEN)
            .finish()
    }
}

/// A compile-time-validated pipeline description: a [`Sequence`] or a
/// [`Parallel`].
///
/// Compositions are stateless and reusable. Instantiate one with
/// [`Executor::apply`](crate::executor::Executor::apply) to obtain a
/// runnable [`Task`]; every instantiation is independent.
pub trait Composition: sealed::Sealed {
    /// Value consumed by the pipeline.
    type Input: Send + 'static;
    /// Value produced by the pipeline.
    type Output: Send + 'static;

    #[doc(hidden)]
    fn instantiate(&self, executor: &Executor, input: Self::Input) -> Task<Self::Output>;

    #[doc(hidden)]
    fn instantiate_deferred(
        &self,
        executor: &Executor,
        getter: Box<dyn FnOnce() -> Self::Input + Send>,
    ) -> Task<Self::Output>;
}

/// Nested use: a sequence is itself a stage.
///
/// Invoking it instantiates a child task on the same executor and runs it
/// to completion while draining the shared group, so nesting cannot starve
/// a small pool.
impl<L> Stage for Sequence<L>
where
    L: SequenceList,
    Sequence<L>: Composition<Input = L::Input, Output = L::Output>,
{
    type Input = L::Input;
    type Output = L::Output;

    fn invoke(&self, executor: &Executor, input: Self::Input) -> Self::Output {
        let mut task = executor.apply(self, input);
        task.execute_draining();
        task.result()
    }
}

/// Nested use: a parallel is itself a stage.
///
/// Same child-task mechanics as the [`Sequence`] stage impl.
impl<L> Stage for Parallel<L>
where
    L: ParallelList,
    Parallel<L>: Composition<Input = L::Input, Output = L::Output>,
{
    type Input = L::Input;
    type Output = L::Output;

    fn invoke(&self, executor: &Executor, input: Self::Input) -> Self::Output {
        let mut task = executor.apply(self, input);
        task.execute_draining();
        task.result()
    }
}

impl<L: SequenceList> sealed::Sealed for Sequence<L> {}
impl<L: ParallelList> sealed::Sealed for Parallel<L> {}

mod sealed {
    pub trait Sealed {}
}
