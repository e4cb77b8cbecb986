use std::io;
use thiserror::Error;

/// Error returned when the executor fails to bring up or resize its worker
/// pool.
///
/// Misuse of the task and composition APIs (scheduling twice, extracting a
/// result early, chaining mismatched stages) is not reported through this
/// type: type mismatches are compile errors and lifecycle misuse panics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {source}")]
    SpawnWorker {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
