#![deny(unsafe_code)]

//! Barrier-synchronized worker pool.
//!
//! This crate provides a fixed-size thread group that runs repeated "blocks" of
//! parallel work over a shared context:
//! - [`pool`] - [`ThreadGroup`], the owner-side handle (spawn, join, last-block, terminate)
//! - [`sync`] - the block-finish rendezvous, with a condvar backend and an event-pair backend
//! - [`startup`] - process-wide thread-creation tuning and CPU detection

pub mod error;
pub mod pool;
pub mod startup;
pub mod sync;

// Re-export commonly used types
pub use error::ThreadError;
pub use pool::{ThreadGroup, WorkerIndex};
pub use startup::{DEFAULT_THREAD_STACK, MAX_THREADS, num_cpu, thread_stack_size};
pub use sync::{BlockSync, CondvarSync, DefaultSync, EventSync};
