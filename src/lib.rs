//! Statically-typed pipeline composition executed on a shared worker pool.
//!
//! This crate assembles computations from unary transformation stages. It:
//! - Chains stages into [`Sequence`]s whose adjacent output/input types must
//!   line up, checked entirely at compile time; a mismatched chain is
//!   rejected before anything runs.
//! - Fans a tuple out over independent [`Parallel`] branches and joins their
//!   outputs back into a tuple, positionally, regardless of finish order.
//! - Nests compositions arbitrarily: a sequence or parallel is itself a
//!   stage, and shared (`Arc`) compositions can appear in several pipelines
//!   at once without duplication.
//! - Runs each instantiation as one-shot contracts drained by a resizable
//!   pool of worker threads sharing a single queue, so stages of unrelated
//!   pipelines load-balance across the same pool.
//!
//! Key modules:
//! - `stage`: the unary transformation abstraction and the conversions that
//!   let closures, compositions, and `Arc`s mix in one stage tuple.
//! - `compose`: `Sequence`/`Parallel` descriptions and their compile-time
//!   chaining rules.
//! - `task`: single-use execution instances with an explicit
//!   schedule/wait/result lifecycle.
//! - `executor` and `contract`: the worker pool and the one-shot work items
//!   it drains.
//!
//! Quick start:
//! 1. Build an [`Executor`] (one per process is typical) and keep the
//!    handle; clones share the same pool.
//! 2. Describe the pipeline once with [`Sequence::new`] and
//!    [`Parallel::new`].
//! 3. Bind it to an input with [`Executor::apply`], then `execute()` the
//!    returned [`Task`] and take its `result()`.
//!
//! ```
//! use stagepool::{Executor, Parallel, Sequence};
//!
//! # fn main() -> Result<(), stagepool::ExecutorError> {
//! let executor = Executor::builder().thread_count(2).build()?;
//!
//! let pipeline = Sequence::new((
//!     |x: i32| (x + 1, x - 1),
//!     Parallel::new((|a: i32| a * 2, |b: i32| b * 3)),
//!     |(a, b): (i32, i32)| a + b,
//! ));
//!
//! let mut task = executor.apply(&pipeline, 10);
//! task.execute();
//! assert_eq!(task.result(), 49);
//! # Ok(())
//! # }
//! ```
//!
//! Within a sequence, stage `i` completes before stage `i + 1` starts, on
//! whichever worker picks the contract up; within a parallel, branches are
//! unordered but every branch's write happens-before the join releases the
//! waiting caller. Tasks are strictly single-use: scheduling twice or
//! extracting a result early is a programming error and panics.

/// Composition descriptions: type-chained [`Sequence`]s, fan-out
/// [`Parallel`]s, and the [`Composition`] trait the executor instantiates
/// tasks from.
pub mod compose;
/// The contract primitive: one-shot schedulable closures and the shared
/// group worker threads drain.
pub mod contract;
/// Typed errors surfaced by executor construction and resizing.
pub mod error;
/// The worker-thread pool, its configuration, and pipeline instantiation.
pub mod executor;
mod slot;
/// The stage abstraction: unary transformations and conversions into them.
pub mod stage;
mod sync;
/// Single-use runtime instances of compositions.
pub mod task;

pub use compose::{
    Composition, IntoParallelList, IntoSequenceList, Parallel, ParallelList, Sequence,
    SequenceList,
};
pub use contract::{Contract, ContractGroup};
pub use error::ExecutorError;
pub use executor::{Executor, ExecutorBuilder, MAX_THREAD_COUNT};
pub use stage::{ChainsAfter, FnMarker, FnStage, IntoStage, Stage, StageMarker};
pub use task::Task;
