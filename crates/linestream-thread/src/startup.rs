//! Process-wide thread-creation settings and CPU detection.
//!
//! The worker stack size is a single immutable value: it may be set once, before
//! any pool spawns, and is read by every subsequent thread creation.

use std::sync::OnceLock;

/// Upper bound on the number of workers in one [`ThreadGroup`](crate::ThreadGroup).
///
/// The event backend waits on every worker's event in turn, so Windows keeps the
/// lower historical limit.
#[cfg(windows)]
pub const MAX_THREADS: usize = 64;

/// Upper bound on the number of workers in one [`ThreadGroup`](crate::ThreadGroup).
#[cfg(not(windows))]
pub const MAX_THREADS: usize = 512;

/// Default worker stack size in bytes.
#[cfg(target_os = "macos")]
pub const DEFAULT_THREAD_STACK: usize = 524_288;

/// Default worker stack size in bytes.
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_THREAD_STACK: usize = 262_144;

static THREAD_STACK: OnceLock<usize> = OnceLock::new();

/// Set the stack size used for all worker threads created from now on.
///
/// Must be called before the first pool is spawned (or the first call to
/// [`thread_stack_size`]). Returns `Err(current)` if the value was already fixed.
pub fn set_thread_stack_size(bytes: usize) -> Result<(), usize> {
    THREAD_STACK.set(bytes).map_err(|_| thread_stack_size())
}

/// The stack size worker threads are created with.
#[must_use]
pub fn thread_stack_size() -> usize {
    *THREAD_STACK.get_or_init(|| DEFAULT_THREAD_STACK)
}

/// Raw number of CPUs reported by the OS, if it could be determined.
#[must_use]
pub fn known_procs() -> Option<usize> {
    std::thread::available_parallelism().ok().map(std::num::NonZero::get)
}

/// Number of CPUs available to this process, clipped to `1..=MAX_THREADS`.
#[must_use]
pub fn num_cpu() -> usize {
    known_procs().unwrap_or(1).clamp(1, MAX_THREADS)
}
