use crate::executor::Executor;
use core::{any::type_name, fmt, marker::PhantomData};
use std::sync::Arc;

/// A unary transformation usable as one step of a pipeline.
///
/// Implemented by closure adapters ([`FnStage`]), by the compositions
/// themselves ([`Sequence`](crate::compose::Sequence) and
/// [`Parallel`](crate::compose::Parallel), which is what lets compositions
/// nest arbitrarily), and by `Arc`s of any stage (shared reuse of one
/// composition). Most code never names this trait directly: values are
/// converted through [`IntoStage`] by `Sequence::new` and `Parallel::new`.
///
/// A stage is immutable once built and carries no execution state. `invoke`
/// receives the executor so that a stage which is itself a composition can
/// run its child task on the same pool.
pub trait Stage: Send + Sync + 'static {
    /// Type consumed by the stage.
    type Input: Send + 'static;
    /// Type produced by the stage.
    type Output: Send + 'static;

    /// Transform one value. Runs on whichever thread executes the enclosing
    /// contract.
    fn invoke(&self, executor: &Executor, input: Self::Input) -> Self::Output;
}

/// Adapter turning any `Fn(I) -> O` into a [`Stage`].
pub struct FnStage<F, I, O> {
    transform: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<F, I, O> FnStage<F, I, O> {
    /// Wrap a unary function or closure.
    pub fn new(transform: F) -> Self {
        Self {
            transform,
            _types: PhantomData,
        }
    }
}

impl<F, I, O> Stage for FnStage<F, I, O>
where
    F: Fn(I) -> O + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn invoke(&self, _executor: &Executor, input: I) -> O {
        (self.transform)(input)
    }
}

impl<F, I, O> fmt::Debug for FnStage<F, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnStage<{} -> {}>", type_name::<I>(), type_name::<O>())
    }
}

/// Shared reuse: an `Arc`'d stage is itself a stage.
///
/// This is how one composition appears as a sub-stage in several places
/// without being duplicated; the `Arc` keeps it alive for as long as any
/// enclosing composition does.
impl<S: Stage> Stage for Arc<S> {
    type Input = S::Input;
    type Output = S::Output;

    fn invoke(&self, executor: &Executor, input: Self::Input) -> Self::Output {
        S::invoke(self, executor, input)
    }
}

/// Marker for the closure-to-stage conversion. Always inferred.
pub struct FnMarker<I, O>(PhantomData<fn(I) -> O>);

/// Marker for values that already are stages. Always inferred.
pub struct StageMarker;

/// Conversion into a [`Stage`], used by `Sequence::new` and `Parallel::new`
/// to accept closures, function pointers, compositions, and `Arc`s of
/// stages uniformly in one tuple.
///
/// The `Marker` parameter keeps the closure and stage conversions from
/// overlapping; it is always inferred at the call site.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be used as a pipeline stage",
    note = "stages are unary `Fn(I) -> O` values, `Sequence`/`Parallel` compositions, or `Arc`s of stages"
)]
pub trait IntoStage<Marker> {
    /// The stage this value converts into.
    type Stage: Stage;

    /// Perform the conversion.
    fn into_stage(self) -> Self::Stage;
}

impl<F, I, O> IntoStage<FnMarker<I, O>> for F
where
    F: Fn(I) -> O + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Stage = FnStage<F, I, O>;

    fn into_stage(self) -> Self::Stage {
        FnStage::new(self)
    }
}

impl<S: Stage> IntoStage<StageMarker> for S {
    type Stage = S;

    fn into_stage(self) -> Self::Stage {
        self
    }
}

/// Requires the implementing stage to consume exactly what `Prev` produces.
///
/// This is the chaining rule for sequences: every adjacent pair of stages
/// must line up, and a mismatch is rejected at compile time before anything
/// runs.
#[diagnostic::on_unimplemented(
    message = "invalid transform chain: type mismatch between `{Prev}` and `{Self}`",
    note = "a sequence stage must consume exactly the type the previous stage produces"
)]
pub trait ChainsAfter<Prev: Stage>: Stage {}

impl<Prev, Next> ChainsAfter<Prev> for Next
where
    Prev: Stage,
    Next: Stage<Input = Prev::Output>,
{
}

#[cfg(test)]
mod tests {
    use super::{ChainsAfter, FnStage, IntoStage, Stage};
    use crate::executor::Executor;
    use std::sync::Arc;

    fn single_worker() -> Executor {
        Executor::builder()
            .thread_count(1)
            .build()
            .expect("executor should start")
    }

    #[test]
    fn fn_stage_invokes_the_wrapped_closure() {
        let executor = single_worker();
        let stage = FnStage::new(|x: i32| x + 41);
        assert_eq!(stage.invoke(&executor, 1), 42);
    }

    #[test]
    fn arc_stages_delegate() {
        let executor = single_worker();
        let stage = Arc::new(FnStage::new(|x: i32| x * 2));
        assert_eq!(stage.invoke(&executor, 21), 42);
    }

    #[test]
    fn closures_convert_into_stages() {
        let executor = single_worker();
        let stage = (|x: u8| u16::from(x) + 1).into_stage();
        assert_eq!(stage.invoke(&executor, 1u8), 2u16);
    }

    #[test]
    fn matching_boundaries_chain() {
        fn assert_chains<A: Stage, B: ChainsAfter<A>>() {}
        assert_chains::<FnStage<fn(i32) -> String, i32, String>, FnStage<fn(String) -> usize, String, usize>>();
    }
}
