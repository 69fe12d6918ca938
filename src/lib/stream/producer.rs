//! Background reader: decodes into the ring ahead of the consumer.
//!
//! Plain, gzip and Zstandard input is decoded sequentially on this thread. BGZF
//! input with more than one decompression thread is split into batches of raw
//! blocks that a [`ThreadGroup`] inflates while this thread reads the next batch
//! and copies finished output into the ring in file order.
//!
//! Ring writes go through the raw accessors of [`RingBuffer`](super::ring::RingBuffer);
//! every range written here comes from `acquire_room`, which only hands out
//! bytes outside the consumer's published region.
#![allow(unsafe_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libdeflater::Decompressor;
use linestream_codec::bgzf::decompress_block_into;
use linestream_codec::{CodecError, FileCompression};
use linestream_thread::{ThreadError, ThreadGroup, WorkerIndex};
use log::{debug, warn};
use memchr::memrchr;
use parking_lot::Mutex;

use super::sync::{Interrupt, Shared, StreamStatus};
use crate::errors::{Result, TextError};
use crate::source::Source;

/// Raw blocks handed to each worker per batch.
const BLOCKS_PER_WORKER: usize = 8;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProducerConfig {
    pub(crate) chunk_size: usize,
    pub(crate) max_line_blen: usize,
    pub(crate) buffer_limit: usize,
    pub(crate) decompress_threads: usize,
}

/// Why production of the current file stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// End of file or an error was published.
    Finished,
    /// The consumer posted an interrupt.
    Interrupted,
}

pub(crate) struct Producer {
    shared: Arc<Shared>,
    config: ProducerConfig,
    /// End of the bytes written so far (the partial line ends here).
    fill: usize,
    pool: Option<ThreadGroup<BatchContext>>,
}

impl Producer {
    pub(crate) fn new(shared: Arc<Shared>, config: ProducerConfig) -> Self {
        Self { shared, config, fill: 0, pool: None }
    }

    /// Serve files until shutdown. `source` is the file opened by the consumer.
    pub(crate) fn run(mut self, source: Source) {
        let mut source = Some(source);
        loop {
            if let Some(current) = source.as_mut() {
                if self.produce(current) == Halt::Finished {
                    debug!("Background reader finished {}", current.path().display());
                }
            }
            match self.wait_for_interrupt() {
                Interrupt::Retarget(path) => {
                    drop(source.take());
                    source = self.retarget(&path);
                }
                Interrupt::Shutdown | Interrupt::None => break,
            }
        }
        if let Some(mut pool) = self.pool.take() {
            if let Err(e) = pool.cleanup() {
                warn!("Error while stopping decompression workers: {e}");
            }
        }
    }

    fn wait_for_interrupt(&self) -> Interrupt {
        let mut state = self.shared.lock();
        while state.interrupt == Interrupt::None {
            self.shared.wait_for_consumer(&mut state);
        }
        state.interrupt.clone()
    }

    /// Open the new file, reset the ring and acknowledge the interrupt.
    fn retarget(&mut self, path: &Path) -> Option<Source> {
        let opened = Source::open(path, self.config.chunk_size);
        let mut state = self.shared.lock();
        if state.interrupt == Interrupt::Shutdown {
            return None;
        }
        state.reset_positions();
        self.fill = 0;
        let source = match opened {
            Ok(source) => {
                state.status = StreamStatus::Running;
                state.compression = Some(source.compression());
                debug!("Background reader switched to {}", path.display());
                Some(source)
            }
            Err(e) => {
                state.status = StreamStatus::Failed(e);
                state.compression = None;
                None
            }
        };
        state.interrupt = Interrupt::None;
        self.shared.wake_consumer(&state);
        source
    }

    fn produce(&mut self, source: &mut Source) -> Halt {
        let result = if source.compression() == FileCompression::Bgzf
            && self.config.decompress_threads > 1
        {
            self.produce_bgzf(source)
        } else {
            self.produce_sequential(source)
        };
        result.unwrap_or_else(|e| {
            self.shared.finish(StreamStatus::Failed(e));
            Halt::Finished
        })
    }

    fn produce_sequential(&mut self, source: &mut Source) -> Result<Halt> {
        loop {
            let Some((start, len)) = self.acquire_room()? else {
                return Ok(Halt::Interrupted);
            };
            // SAFETY: `acquire_room` hands out a range the consumer cannot read.
            let out = unsafe { self.shared.ring.slice_mut(start, start + len) };
            let n = source.read(out)?;
            if n == 0 {
                return self.finish_stream();
            }
            self.commit(start, n)?;
        }
    }

    /// Wait until the ring has free space at `fill`, relocating the partial line
    /// to the front (and growing an owned ring) when needed.
    ///
    /// Returns `None` if an interrupt is pending.
    fn acquire_room(&mut self) -> Result<Option<(usize, usize)>> {
        let shared = Arc::clone(&self.shared);
        let chunk = self.config.chunk_size;
        let mut state = shared.lock();
        loop {
            if state.interrupt != Interrupt::None {
                return Ok(None);
            }
            // SAFETY: only this thread resizes the ring.
            let len = unsafe { shared.ring.len() };

            if state.wrapped {
                if state.consume_tail > self.fill {
                    return Ok(Some((self.fill, (state.consume_tail - self.fill).min(chunk))));
                }
            } else {
                let end_room = len - self.fill;
                if end_room >= chunk {
                    return Ok(Some((self.fill, chunk)));
                }
                let avail = state.available_end;
                let partial = self.fill - avail;

                if state.consume_tail == avail {
                    // Consumer is drained and holds no view: restart at the front.
                    // SAFETY: nothing in the ring is readable by the consumer.
                    unsafe { shared.ring.copy_within(avail..self.fill, 0) };
                    self.fill = partial;
                    state.reset_positions();
                    if shared.ring.is_owned() && len - partial < chunk && len < self.config.buffer_limit {
                        let new_len = (2 * len).max(partial + chunk).min(self.config.buffer_limit);
                        // SAFETY: as above, the consumer holds no view.
                        unsafe { shared.ring.grow(new_len)? };
                        debug!("Grew stream buffer to {new_len} bytes");
                    }
                    // SAFETY: only this thread resizes the ring.
                    let len = unsafe { shared.ring.len() };
                    if len > self.fill {
                        return Ok(Some((self.fill, (len - self.fill).min(chunk))));
                    }
                    return Err(TextError::long_line(Path::new(""), 0, self.config.max_line_blen));
                }

                let tail_room = state.consume_tail.saturating_sub(partial);
                if tail_room > 0 && (tail_room >= chunk || tail_room > end_room) {
                    // Wrap: the consumer finishes the upper segment while we
                    // continue below its tail.
                    // SAFETY: `0..partial` lies below the consumer's tail and the
                    // partial line was never published.
                    unsafe { shared.ring.copy_within(avail..self.fill, 0) };
                    state.cur_circular_end = avail;
                    state.available_end = 0;
                    state.wrapped = true;
                    self.fill = partial;
                    continue;
                }
                if end_room > 0 {
                    return Ok(Some((self.fill, end_room)));
                }
            }
            shared.wait_for_consumer(&mut state);
        }
    }

    /// Account for `n` bytes written at `start` and publish any complete lines.
    fn commit(&mut self, start: usize, n: usize) -> Result<()> {
        // SAFETY: these bytes were just written by this thread and are unpublished.
        let written = unsafe { self.shared.ring.slice(start, start + n) };
        let last_newline = memrchr(b'\n', written);
        self.fill = start + n;

        let mut state = self.shared.lock();
        if let Some(pos) = last_newline {
            state.available_end = start + pos + 1;
            self.shared.wake_consumer(&state);
        }
        if self.fill - state.available_end > self.config.max_line_blen {
            return Err(TextError::long_line(Path::new(""), 0, self.config.max_line_blen));
        }
        Ok(())
    }

    /// Terminate a trailing partial line and publish end of file.
    fn finish_stream(&mut self) -> Result<Halt> {
        let has_partial = self.fill > self.shared.lock().available_end;
        if has_partial {
            let Some((start, _)) = self.acquire_room()? else {
                return Ok(Halt::Interrupted);
            };
            // SAFETY: `acquire_room` hands out a range the consumer cannot read.
            unsafe { self.shared.ring.slice_mut(start, start + 1)[0] = b'\n' };
            self.commit(start, 1)?;
        }
        self.shared.finish(StreamStatus::Eof);
        Ok(Halt::Finished)
    }

    /// Copy decoded bytes into the ring. Returns `false` if interrupted.
    fn push(&mut self, mut data: &[u8]) -> Result<bool> {
        while !data.is_empty() {
            let Some((start, len)) = self.acquire_room()? else {
                return Ok(false);
            };
            let n = len.min(data.len());
            // SAFETY: `acquire_room` hands out a range the consumer cannot read.
            unsafe { self.shared.ring.slice_mut(start, start + n) }.copy_from_slice(&data[..n]);
            self.commit(start, n)?;
            data = &data[n..];
        }
        Ok(true)
    }

    // ========================================================================
    // Parallel BGZF
    // ========================================================================

    fn produce_bgzf(&mut self, source: &mut Source) -> Result<Halt> {
        let thread_ct = self.config.decompress_threads;
        let mut pool = match self.pool.take() {
            Some(pool) => pool,
            None => ThreadGroup::new(thread_ct).map_err(|e| thread_error(source.path(), e))?,
        };
        let context = Arc::new(BatchContext::new(pool.thread_count())?);
        pool.set_work(decompress_batch, Arc::clone(&context));

        let result = self.run_batches(source, &mut pool, &context);
        let stopped = pool.terminate().map_err(|e| thread_error(source.path(), e));
        self.pool = Some(pool);
        let halt = result?;
        stopped?;
        Ok(halt)
    }

    fn run_batches(
        &mut self,
        source: &mut Source,
        pool: &mut ThreadGroup<BatchContext>,
        context: &BatchContext,
    ) -> Result<Halt> {
        let mut half = 0;
        let mut count = context.read_batch(source, half)?;
        if count == 0 {
            return self.finish_stream();
        }
        context.publish(half, count);
        if source.is_exhausted() {
            pool.declare_last_block();
        }
        pool.spawn().map_err(|e| thread_error(source.path(), e))?;

        loop {
            let next = 1 - half;
            let next_count =
                if pool.is_last_block() { 0 } else { context.read_batch(source, next)? };
            pool.join().map_err(|e| thread_error(source.path(), e))?;
            if next_count > 0 {
                context.publish(next, next_count);
                if source.is_exhausted() {
                    pool.declare_last_block();
                }
                pool.spawn().map_err(|e| thread_error(source.path(), e))?;
            }

            for slot in context.batch(half, count) {
                let slot = slot.lock();
                if let Some(e) = &slot.error {
                    return Err(TextError::from_codec(source.path(), e.clone()));
                }
                if !self.push(&slot.decoded)? {
                    return Ok(Halt::Interrupted);
                }
            }

            if next_count == 0 {
                return self.finish_stream();
            }
            half = next;
            count = next_count;
        }
    }
}

fn thread_error(path: &Path, error: ThreadError) -> TextError {
    let path = path.display().to_string();
    match error {
        ThreadError::OutOfMemory { what, thread_ct } => {
            TextError::OutOfMemory { what: format!("{what} ({thread_ct} threads)"), bytes: 0 }
        }
        ThreadError::Spawn { .. } => {
            TextError::ThreadCreateFailure { path, reason: error.to_string() }
        }
        other => TextError::DecompressFailure { path, reason: other.to_string() },
    }
}

/// One raw BGZF block and its inflated contents.
#[derive(Default)]
struct BlockSlot {
    raw: Vec<u8>,
    decoded: Vec<u8>,
    error: Option<CodecError>,
}

/// Double-buffered batches of blocks shared with the decompression workers.
struct BatchContext {
    batch_len: usize,
    /// `2 * batch_len` slots: two halves, one decoding while the other is filled.
    slots: Vec<Mutex<BlockSlot>>,
    decompressors: Vec<Mutex<Decompressor>>,
    first: AtomicUsize,
    count: AtomicUsize,
}

impl BatchContext {
    fn new(thread_ct: usize) -> Result<Self> {
        let batch_len = thread_ct * BLOCKS_PER_WORKER;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(2 * batch_len)
            .map_err(|_| TextError::out_of_memory("BGZF batch slots", 2 * batch_len))?;
        slots.extend((0..2 * batch_len).map(|_| Mutex::new(BlockSlot::default())));
        let decompressors = (0..thread_ct).map(|_| Mutex::new(Decompressor::new())).collect();
        Ok(Self {
            batch_len,
            slots,
            decompressors,
            first: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        })
    }

    /// Read up to one batch of raw blocks into `half`. Returns the block count.
    fn read_batch(&self, source: &mut Source, half: usize) -> Result<usize> {
        let mut count = 0;
        for slot in self.batch(half, self.batch_len) {
            if !source.next_raw_block(&mut slot.lock().raw)? {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Make `half` (with `count` blocks) the batch the next spawn decodes.
    fn publish(&self, half: usize, count: usize) {
        self.first.store(half * self.batch_len, Ordering::Release);
        self.count.store(count, Ordering::Release);
    }

    fn batch(&self, half: usize, count: usize) -> &[Mutex<BlockSlot>] {
        let first = half * self.batch_len;
        &self.slots[first..first + count]
    }
}

/// Worker body: inflate every `thread_ct`-th block of the published batch.
fn decompress_batch(worker: WorkerIndex, context: &BatchContext) {
    let first = context.first.load(Ordering::Acquire);
    let count = context.count.load(Ordering::Acquire);
    let mut decompressor = context.decompressors[worker.tidx].lock();
    for idx in (worker.tidx..count).step_by(worker.thread_ct) {
        let mut slot = context.slots[first + idx].lock();
        let slot = &mut *slot;
        slot.error = decompress_block_into(&slot.raw, &mut decompressor, &mut slot.decoded).err();
    }
}
