//! State shared between a [`TextStream`](super::TextStream) and its background reader.
//!
//! Ring positions while the producer is writing after the consumer:
//!
//! ```text
//! 0          consume_tail        available_end     (producer fill)      len
//! |   free   |  published lines  |  partial line   |       free         |
//! ```
//!
//! After a wrap the producer continues at the front while the consumer finishes
//! the upper segment, which ends at `cur_circular_end`:
//!
//! ```text
//! 0     available_end   fill      consume_tail        cur_circular_end   len
//! | lines | partial line | free  |  published lines  |     unused        |
//! ```

use std::path::PathBuf;

use linestream_codec::FileCompression;
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::ring::RingBuffer;
use crate::errors::TextError;

/// Request from the consumer to the background reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interrupt {
    None,
    /// Switch to another file (or reopen the same one to rewind).
    Retarget(PathBuf),
    /// Stop and exit.
    Shutdown,
}

/// Producer-side outcome published to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamStatus {
    Running,
    Eof,
    Failed(TextError),
}

#[derive(Debug)]
pub(crate) struct SyncState {
    /// Where the consumer resumes reading; published by the consumer.
    pub(crate) consume_tail: usize,
    /// End of the upper segment while `wrapped` is set.
    pub(crate) cur_circular_end: usize,
    /// One past the last complete line the producer has published.
    pub(crate) available_end: usize,
    /// The consumer is still reading the segment ending at `cur_circular_end`.
    pub(crate) wrapped: bool,
    pub(crate) status: StreamStatus,
    pub(crate) interrupt: Interrupt,
    pub(crate) compression: Option<FileCompression>,
    pub(crate) consumer_waiting: bool,
    pub(crate) producer_waiting: bool,
    pub(crate) producer_exited: bool,
}

impl SyncState {
    fn new(compression: FileCompression) -> Self {
        Self {
            consume_tail: 0,
            cur_circular_end: 0,
            available_end: 0,
            wrapped: false,
            status: StreamStatus::Running,
            interrupt: Interrupt::None,
            compression: Some(compression),
            consumer_waiting: false,
            producer_waiting: false,
            producer_exited: false,
        }
    }

    /// Forget all positions; used when switching files.
    pub(crate) fn reset_positions(&mut self) {
        self.consume_tail = 0;
        self.cur_circular_end = 0;
        self.available_end = 0;
        self.wrapped = false;
    }
}

pub(crate) struct Shared {
    pub(crate) ring: RingBuffer,
    state: Mutex<SyncState>,
    /// Signalled by the producer: new lines, a status change or an acknowledged interrupt.
    reader_progress: Condvar,
    /// Signalled by the consumer: space freed or an interrupt posted.
    consumer_progress: Condvar,
}

impl Shared {
    pub(crate) fn new(ring: RingBuffer, compression: FileCompression) -> Self {
        Self {
            ring,
            state: Mutex::new(SyncState::new(compression)),
            reader_progress: Condvar::new(),
            consumer_progress: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock()
    }

    pub(crate) fn wake_consumer(&self, state: &SyncState) {
        if state.consumer_waiting {
            self.reader_progress.notify_all();
        }
    }

    pub(crate) fn wake_producer(&self, state: &SyncState) {
        if state.producer_waiting {
            self.consumer_progress.notify_all();
        }
    }

    pub(crate) fn wait_for_producer(&self, state: &mut MutexGuard<'_, SyncState>) {
        state.consumer_waiting = true;
        self.reader_progress.wait(state);
        state.consumer_waiting = false;
    }

    pub(crate) fn wait_for_consumer(&self, state: &mut MutexGuard<'_, SyncState>) {
        state.producer_waiting = true;
        self.consumer_progress.wait(state);
        state.producer_waiting = false;
    }

    /// Post an interrupt and wake the producer wherever it is waiting.
    pub(crate) fn interrupt(&self, state: &mut SyncState, interrupt: Interrupt) {
        state.interrupt = interrupt;
        self.consumer_progress.notify_all();
    }

    /// Publish a terminal status and wake the consumer.
    pub(crate) fn finish(&self, status: StreamStatus) {
        let mut state = self.lock();
        state.status = status;
        self.wake_consumer(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reset_positions() {
        let mut state = SyncState::new(FileCompression::Plain);
        state.consume_tail = 5;
        state.available_end = 9;
        state.cur_circular_end = 12;
        state.wrapped = true;
        state.reset_positions();
        assert_eq!((state.consume_tail, state.available_end, state.cur_circular_end), (0, 0, 0));
        assert!(!state.wrapped);
    }

    #[test]
    fn test_finish_wakes_waiting_consumer() {
        let shared = Arc::new(Shared::new(RingBuffer::owned(8).unwrap(), FileCompression::Plain));
        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                loop {
                    if shared.lock().consumer_waiting {
                        break;
                    }
                    thread::yield_now();
                }
                shared.finish(StreamStatus::Eof);
            })
        };
        let mut state = shared.lock();
        while state.status == StreamStatus::Running {
            shared.wait_for_producer(&mut state);
        }
        assert_eq!(state.status, StreamStatus::Eof);
        drop(state);
        producer.join().unwrap();
    }
}
