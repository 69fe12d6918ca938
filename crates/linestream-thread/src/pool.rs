//! A fixed-size worker group that runs repeated blocks of work.
//!
//! The owner registers a work function and a shared context, then alternates
//! [`spawn`](ThreadGroup::spawn) and [`join`](ThreadGroup::join). The first `spawn`
//! creates the workers; later calls release the already-parked workers into the
//! next block. Each worker runs the work function once per block and then parks
//! at the block barrier until released again.
//!
//! Before releasing the final block the owner calls
//! [`declare_last_block`](ThreadGroup::declare_last_block); workers then exit after
//! that block instead of parking, and the matching `join` reaps them.
//!
//! The context is shared by reference with every worker. The owner may only
//! change it between `join` and the next `spawn`; the context should use interior
//! mutability (atomics, per-slot mutexes) for anything it changes between blocks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use linestream_thread::ThreadGroup;
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let mut group: ThreadGroup<AtomicUsize> = ThreadGroup::new(4).unwrap();
//! group.set_work(|_, hits: &AtomicUsize| { hits.fetch_add(1, Ordering::SeqCst); }, Arc::clone(&hits));
//!
//! group.spawn().unwrap();
//! group.join().unwrap();
//! group.declare_last_block();
//! group.spawn().unwrap();
//! group.join().unwrap();
//!
//! assert_eq!(hits.load(Ordering::SeqCst), 8);
//! assert!(!group.is_active());
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::ThreadError;
use crate::startup::{MAX_THREADS, thread_stack_size};
use crate::sync::{BlockSync, DefaultSync};

const RUNNING: u8 = 0;
const LAST_BLOCK: u8 = 1;
const TERMINATE: u8 = 2;

const NO_PANIC: usize = usize::MAX;

/// Identity of a worker, passed to the work function on every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIndex {
    /// This worker's index in `0..thread_ct`.
    pub tidx: usize,
    /// Number of workers in the group.
    pub thread_ct: usize,
}

type WorkFn<C> = dyn Fn(WorkerIndex, &C) + Send + Sync;

/// State shared between the owner and every worker.
struct Control<S> {
    sync: S,
    last_block: AtomicU8,
    panicked: AtomicUsize,
}

impl<S: BlockSync> Control<S> {
    /// Worker side of the end-of-block barrier.
    ///
    /// Returns `true` if the worker was released into another block, `false` if
    /// it should exit (last block completed, or the group is terminating).
    fn block_finish(&self, tidx: usize) -> bool {
        if self.last_block.load(Ordering::Acquire) != RUNNING {
            return false;
        }
        self.sync.finish_block(tidx);
        self.last_block.load(Ordering::Acquire) != TERMINATE
    }
}

fn run_worker<C, S: BlockSync>(
    index: WorkerIndex,
    control: &Control<S>,
    work: &WorkFn<C>,
    context: &C,
) {
    loop {
        if catch_unwind(AssertUnwindSafe(|| work(index, context))).is_err() {
            let _ = control.panicked.compare_exchange(
                NO_PANIC,
                index.tidx,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
        if !control.block_finish(index.tidx) {
            break;
        }
    }
}

/// Owner-side handle for a group of barrier-synchronized workers.
///
/// `S` selects the rendezvous backend; see [`crate::sync`].
pub struct ThreadGroup<C: Send + Sync + 'static, S: BlockSync = DefaultSync> {
    thread_ct: usize,
    control: Arc<Control<S>>,
    work: Option<Arc<WorkFn<C>>>,
    context: Option<Arc<C>>,
    threads: Vec<JoinHandle<()>>,
    is_active: bool,
    is_unjoined: bool,
}

impl<C: Send + Sync + 'static, S: BlockSync> ThreadGroup<C, S> {
    /// Create a group of `thread_ct` workers, clipped to `1..=MAX_THREADS`.
    ///
    /// No threads are started until the first [`spawn`](Self::spawn).
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::OutOfMemory`] if the per-worker bookkeeping cannot be allocated.
    pub fn new(thread_ct: usize) -> Result<Self, ThreadError> {
        let clipped = thread_ct.clamp(1, MAX_THREADS);
        if clipped != thread_ct {
            debug!("Clipping requested thread count {thread_ct} to {clipped}");
        }

        let mut threads = Vec::new();
        threads
            .try_reserve_exact(clipped)
            .map_err(|_| ThreadError::OutOfMemory { what: "thread handles", thread_ct: clipped })?;

        Ok(Self {
            thread_ct: clipped,
            control: Arc::new(Control {
                sync: S::new(clipped),
                last_block: AtomicU8::new(RUNNING),
                panicked: AtomicUsize::new(NO_PANIC),
            }),
            work: None,
            context: None,
            threads,
            is_active: false,
            is_unjoined: false,
        })
    }

    /// Number of workers in the group (after clipping).
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_ct
    }

    /// True while worker threads exist (between the first `spawn` and the last-block `join`).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// True between a `spawn` and its matching `join`.
    #[must_use]
    pub fn is_unjoined(&self) -> bool {
        self.is_unjoined
    }

    /// True once [`declare_last_block`](Self::declare_last_block) has been called for this run.
    #[must_use]
    pub fn is_last_block(&self) -> bool {
        self.control.last_block.load(Ordering::Acquire) != RUNNING
    }

    /// The shared context registered with [`set_work`](Self::set_work).
    #[must_use]
    pub fn context(&self) -> Option<&Arc<C>> {
        self.context.as_ref()
    }

    /// Register the per-block work function and the context every worker sees.
    ///
    /// # Panics
    ///
    /// Panics if workers are alive; finish the current run (last block + join,
    /// or [`terminate`](Self::terminate)) first.
    pub fn set_work<F>(&mut self, work: F, context: Arc<C>)
    where
        F: Fn(WorkerIndex, &C) + Send + Sync + 'static,
    {
        assert!(!self.is_active, "set_work() called while workers are alive");
        self.work = Some(Arc::new(work));
        self.context = Some(context);
        self.control.last_block.store(RUNNING, Ordering::Release);
    }

    /// Prepare a finished group for another run with the same work function.
    ///
    /// # Panics
    ///
    /// Panics if workers are alive.
    pub fn reinit(&mut self) {
        assert!(!self.is_active, "reinit() called while workers are alive");
        self.control.last_block.store(RUNNING, Ordering::Release);
    }

    /// Mark the next block as the final one: workers exit after it.
    ///
    /// # Panics
    ///
    /// Panics if a block is currently unjoined.
    pub fn declare_last_block(&mut self) {
        assert!(!self.is_unjoined, "declare_last_block() called with an unjoined block");
        self.control.last_block.store(LAST_BLOCK, Ordering::Release);
    }

    /// Start the next block: create the workers on the first call, release them afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::NoWork`] if no work function was registered, or
    /// [`ThreadError::Spawn`] if the OS refused to create a worker. On spawn
    /// failure any workers already started are reaped before returning.
    ///
    /// # Panics
    ///
    /// Panics if the previous block has not been joined.
    pub fn spawn(&mut self) -> Result<(), ThreadError> {
        assert!(!self.is_unjoined, "spawn() called before join() of the previous block");
        if self.is_active {
            self.control.sync.release_next();
        } else {
            self.start_threads()?;
        }
        self.is_unjoined = true;
        Ok(())
    }

    fn start_threads(&mut self) -> Result<(), ThreadError> {
        let (Some(work), Some(context)) = (self.work.clone(), self.context.clone()) else {
            return Err(ThreadError::NoWork);
        };

        self.control.sync.reset();
        self.control.panicked.store(NO_PANIC, Ordering::Relaxed);
        let stack_size = thread_stack_size();

        for tidx in 0..self.thread_ct {
            let index = WorkerIndex { tidx, thread_ct: self.thread_ct };
            let control = Arc::clone(&self.control);
            let work = Arc::clone(&work);
            let context = Arc::clone(&context);

            let spawned = thread::Builder::new()
                .name(format!("linestream-worker-{tidx}"))
                .stack_size(stack_size)
                .spawn(move || run_worker(index, &control, &*work, &context));

            match spawned {
                Ok(handle) => self.threads.push(handle),
                Err(source) => {
                    // Workers already running exit at their first barrier.
                    self.control.last_block.store(TERMINATE, Ordering::Release);
                    self.reap();
                    return Err(ThreadError::Spawn { tidx, source });
                }
            }
        }

        debug!("Started {} worker threads (stack size {stack_size} bytes)", self.thread_ct);
        self.is_active = true;
        Ok(())
    }

    /// Wait for the current block to finish on every worker.
    ///
    /// After the last block this also joins the worker threads. Does nothing
    /// if no block is unjoined.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::WorkerPanicked`] if any worker's work function
    /// panicked since the previous join. The barrier is still honoured.
    pub fn join(&mut self) -> Result<(), ThreadError> {
        if !self.is_unjoined {
            return Ok(());
        }
        self.is_unjoined = false;

        if self.control.last_block.load(Ordering::Acquire) == RUNNING {
            self.control.sync.wait_block_done();
        } else {
            self.reap();
        }

        match self.control.panicked.swap(NO_PANIC, Ordering::AcqRel) {
            NO_PANIC => Ok(()),
            tidx => Err(ThreadError::WorkerPanicked { tidx }),
        }
    }

    fn reap(&mut self) {
        for handle in self.threads.drain(..) {
            // Work-function panics are caught inside the worker.
            let _ = handle.join();
        }
        self.is_active = false;
    }

    /// Stop the workers without running another block.
    ///
    /// Waits for any unjoined block, then wakes parked workers with a terminate
    /// signal and joins them. Safe to call on an idle or never-spawned group.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::WorkerPanicked`] if the block being joined had a panicking worker.
    pub fn terminate(&mut self) -> Result<(), ThreadError> {
        let joined = self.join();
        if self.is_active {
            self.control.last_block.store(TERMINATE, Ordering::Release);
            self.control.sync.release_next();
            self.reap();
        }
        self.control.last_block.store(RUNNING, Ordering::Release);
        joined
    }

    /// Terminate the workers and drop the work function and context.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// See [`terminate`](Self::terminate).
    pub fn cleanup(&mut self) -> Result<(), ThreadError> {
        let result = self.terminate();
        self.work = None;
        self.context = None;
        result
    }
}

impl<C: Send + Sync + 'static, S: BlockSync> Drop for ThreadGroup<C, S> {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Error while shutting down worker threads: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{CondvarSync, EventSync};
    use std::time::Duration;

    /// Records, per block, how many workers finished and whether any worker
    /// started a block before the previous one had fully finished.
    struct BlockLog {
        block: AtomicUsize,
        completed: Vec<AtomicUsize>,
        violations: AtomicUsize,
    }

    impl BlockLog {
        fn new(blocks: usize) -> Self {
            Self {
                block: AtomicUsize::new(0),
                completed: (0..blocks).map(|_| AtomicUsize::new(0)).collect(),
                violations: AtomicUsize::new(0),
            }
        }
    }

    fn log_block(worker: WorkerIndex, log: &BlockLog) {
        let block = log.block.load(Ordering::SeqCst);
        if block > 0 && log.completed[block - 1].load(Ordering::SeqCst) != worker.thread_ct {
            log.violations.fetch_add(1, Ordering::SeqCst);
        }
        if worker.tidx % 2 == 0 {
            thread::sleep(Duration::from_micros(200));
        }
        log.completed[block].fetch_add(1, Ordering::SeqCst);
    }

    fn run_blocks<S: BlockSync>(thread_ct: usize, blocks: usize) {
        let log = Arc::new(BlockLog::new(blocks));
        let mut group: ThreadGroup<BlockLog, S> = ThreadGroup::new(thread_ct).unwrap();
        group.set_work(log_block, Arc::clone(&log));

        for block in 0..blocks {
            log.block.store(block, Ordering::SeqCst);
            if block == blocks - 1 {
                group.declare_last_block();
            }
            group.spawn().unwrap();
            group.join().unwrap();
            assert_eq!(log.completed[block].load(Ordering::SeqCst), thread_ct);
        }

        assert!(!group.is_active());
        assert_eq!(log.violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_barrier_condvar_backend() {
        run_blocks::<CondvarSync>(4, 25);
    }

    #[test]
    fn test_barrier_event_backend() {
        run_blocks::<EventSync>(4, 25);
    }

    #[test]
    fn test_single_worker_many_blocks() {
        run_blocks::<DefaultSync>(1, 50);
    }

    #[test]
    fn test_thread_count_is_clipped() {
        let group: ThreadGroup<()> = ThreadGroup::new(0).unwrap();
        assert_eq!(group.thread_count(), 1);
        let group: ThreadGroup<()> = ThreadGroup::new(MAX_THREADS + 10).unwrap();
        assert_eq!(group.thread_count(), MAX_THREADS);
    }

    #[test]
    fn test_spawn_without_work_fails() {
        let mut group: ThreadGroup<()> = ThreadGroup::new(2).unwrap();
        assert!(matches!(group.spawn(), Err(ThreadError::NoWork)));
        assert!(!group.is_active());
        assert!(!group.is_unjoined());
    }

    #[test]
    fn test_last_block_declared_before_first_spawn_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut group: ThreadGroup<AtomicUsize> = ThreadGroup::new(3).unwrap();
        group.set_work(
            |_, hits: &AtomicUsize| {
                hits.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&hits),
        );
        group.declare_last_block();
        group.spawn().unwrap();
        group.join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!group.is_active());
    }

    #[test]
    fn test_group_can_be_reused_after_last_block() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut group: ThreadGroup<AtomicUsize> = ThreadGroup::new(2).unwrap();
        group.set_work(
            |_, hits: &AtomicUsize| {
                hits.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&hits),
        );

        group.declare_last_block();
        group.spawn().unwrap();
        group.join().unwrap();

        group.reinit();
        assert!(!group.is_last_block());
        group.spawn().unwrap();
        group.join().unwrap();
        group.declare_last_block();
        group.spawn().unwrap();
        group.join().unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_terminate_parked_workers() {
        for _ in 0..10 {
            let hits = Arc::new(AtomicUsize::new(0));
            let mut group: ThreadGroup<AtomicUsize, EventSync> = ThreadGroup::new(4).unwrap();
            group.set_work(
                |_, hits: &AtomicUsize| {
                    hits.fetch_add(1, Ordering::SeqCst);
                },
                Arc::clone(&hits),
            );
            group.spawn().unwrap();
            group.join().unwrap();
            group.terminate().unwrap();
            assert!(!group.is_active());
            assert_eq!(hits.load(Ordering::SeqCst), 4);
        }
    }

    #[test]
    fn test_drop_with_unjoined_block_does_not_hang() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let mut group: ThreadGroup<AtomicUsize, CondvarSync> = ThreadGroup::new(4).unwrap();
            group.set_work(
                |_, hits: &AtomicUsize| {
                    hits.fetch_add(1, Ordering::SeqCst);
                },
                Arc::clone(&hits),
            );
            group.spawn().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut group: ThreadGroup<()> = ThreadGroup::new(2).unwrap();
        group.cleanup().unwrap();
        group.set_work(|_, _: &()| {}, Arc::new(()));
        group.spawn().unwrap();
        group.cleanup().unwrap();
        group.cleanup().unwrap();
        assert!(group.context().is_none());
    }

    #[test]
    fn test_worker_panic_is_reported_at_join() {
        let mut group: ThreadGroup<()> = ThreadGroup::new(3).unwrap();
        group.set_work(
            |worker, _: &()| {
                assert_ne!(worker.tidx, 1, "worker 1 fails");
            },
            Arc::new(()),
        );
        group.spawn().unwrap();
        let err = group.join().unwrap_err();
        assert!(matches!(err, ThreadError::WorkerPanicked { tidx: 1 }));
        // Barrier is intact: the group can still be shut down cleanly.
        group.terminate().unwrap();
    }
}
