//! Block-finish rendezvous backends for [`ThreadGroup`](crate::ThreadGroup).
//!
//! Two interchangeable implementations of the barrier between blocks:
//!
//! - [`CondvarSync`]: one mutex guarding an active-worker count and a spawn
//!   generation, plus a "current block done" condvar and a "start next block" condvar.
//! - [`EventSync`]: a pair of auto-reset events per worker ("done" and "start
//!   next"); the owner waits on every worker's done event in turn.
//!
//! [`DefaultSync`] selects the event backend on Windows and the condvar backend
//! elsewhere. Both are compiled on every platform.

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};

/// The rendezvous a worker and the owner use at the end of each block.
///
/// The owner calls [`wait_block_done`](Self::wait_block_done) to join a block and
/// [`release_next`](Self::release_next) to start the following one. Workers call
/// [`finish_block`](Self::finish_block) after their work for the block, which
/// returns only once the owner has released the next block.
pub trait BlockSync: Send + Sync + 'static {
    /// Create a rendezvous for `thread_ct` workers, armed for the first block.
    fn new(thread_ct: usize) -> Self
    where
        Self: Sized;

    /// Re-arm for a fresh first block. Only called while no worker is alive.
    fn reset(&self);

    /// Worker `tidx`: report the current block done and wait for the next release.
    fn finish_block(&self, tidx: usize);

    /// Owner: block until every worker has reported the current block done.
    fn wait_block_done(&self);

    /// Owner: release every worker into the next block.
    fn release_next(&self);
}

// ============================================================================
// Condition-variable backend
// ============================================================================

#[derive(Debug)]
struct CondvarState {
    active_ct: usize,
    spawn_ct: u64,
}

/// Mutex + two condvars; the owner and workers coordinate through a counter.
#[derive(Debug)]
pub struct CondvarSync {
    thread_ct: usize,
    state: Mutex<CondvarState>,
    cur_block_done: Condvar,
    start_next: Condvar,
}

impl BlockSync for CondvarSync {
    fn new(thread_ct: usize) -> Self {
        Self {
            thread_ct,
            state: Mutex::new(CondvarState { active_ct: thread_ct, spawn_ct: 0 }),
            cur_block_done: Condvar::new(),
            start_next: Condvar::new(),
        }
    }

    fn reset(&self) {
        self.state.lock().active_ct = self.thread_ct;
    }

    fn finish_block(&self, _tidx: usize) {
        let mut state = self.state.lock();
        let initial_spawn_ct = state.spawn_ct;
        state.active_ct -= 1;
        if state.active_ct == 0 {
            self.cur_block_done.notify_one();
        }
        while state.spawn_ct == initial_spawn_ct {
            self.start_next.wait(&mut state);
        }
    }

    fn wait_block_done(&self) {
        let mut state = self.state.lock();
        while state.active_ct != 0 {
            self.cur_block_done.wait(&mut state);
        }
    }

    fn release_next(&self) {
        let mut state = self.state.lock();
        state.spawn_ct = state.spawn_ct.wrapping_add(1);
        state.active_ct = self.thread_ct;
        self.start_next.notify_all();
    }
}

// ============================================================================
// Event-pair backend
// ============================================================================

/// An auto-reset event: `set` latches at most one pending signal, `wait` consumes it.
#[derive(Debug)]
struct Event {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Event {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    fn set(&self) {
        // Full means already signalled.
        let _ = self.tx.try_send(());
    }

    fn wait(&self) {
        // Cannot disconnect: `self` owns the sender.
        let _ = self.rx.recv();
    }

    fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// One "done" and one "start next" event per worker.
#[derive(Debug)]
pub struct EventSync {
    cur_block_done: Vec<Event>,
    start_next: Vec<Event>,
}

impl BlockSync for EventSync {
    fn new(thread_ct: usize) -> Self {
        Self {
            cur_block_done: (0..thread_ct).map(|_| Event::new()).collect(),
            start_next: (0..thread_ct).map(|_| Event::new()).collect(),
        }
    }

    fn reset(&self) {
        self.cur_block_done.iter().chain(&self.start_next).for_each(Event::clear);
    }

    fn finish_block(&self, tidx: usize) {
        self.cur_block_done[tidx].set();
        self.start_next[tidx].wait();
    }

    fn wait_block_done(&self) {
        for event in &self.cur_block_done {
            event.wait();
        }
    }

    fn release_next(&self) {
        for event in &self.start_next {
            event.set();
        }
    }
}

/// The backend [`ThreadGroup`](crate::ThreadGroup) uses unless told otherwise.
#[cfg(windows)]
pub type DefaultSync = EventSync;

/// The backend [`ThreadGroup`](crate::ThreadGroup) uses unless told otherwise.
#[cfg(not(windows))]
pub type DefaultSync = CondvarSync;
