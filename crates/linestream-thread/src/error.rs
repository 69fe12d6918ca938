//! Error types for thread-group operations.

use thiserror::Error;

/// Error type for [`ThreadGroup`](crate::ThreadGroup) operations.
#[derive(Error, Debug)]
pub enum ThreadError {
    /// Per-worker bookkeeping could not be allocated.
    #[error("Out of memory allocating {what} for {thread_ct} threads")]
    OutOfMemory {
        /// What was being allocated
        what: &'static str,
        /// Requested thread count
        thread_ct: usize,
    },

    /// The OS refused to create a worker thread.
    #[error("Failed to spawn worker thread {tidx}: {source}")]
    Spawn {
        /// Index of the worker that failed to start
        tidx: usize,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// `spawn()` was called before `set_work()`.
    #[error("No work function registered before spawn")]
    NoWork,

    /// A worker's work function panicked during a block.
    #[error("Worker thread {tidx} panicked")]
    WorkerPanicked {
        /// Index of the first worker observed to panic
        tidx: usize,
    },
}
