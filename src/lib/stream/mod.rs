//! Line reader with decompression on a background thread.
//!
//! [`TextStream`] has the same line interface as [`TextReader`](crate::reader::TextReader),
//! but a producer thread decodes ahead into a shared ring buffer while the
//! caller consumes lines. BGZF input is additionally inflated by a pool of
//! decompression workers. Lines are always contiguous in the ring: a partial
//! line is copied to the front before the producer wraps.
//!
//! The stream can be pointed at another file with [`retarget`](TextStream::retarget)
//! without restarting the background thread; [`rewind`](TextStream::rewind) is
//! a retarget to the current file.

mod producer;
mod ring;
mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use linestream_codec::FileCompression;
use linestream_thread::thread_stack_size;
use log::{debug, warn};
use memchr::memchr;

use crate::errors::{ErrorKind, Result, TextError};
use crate::options::{BufferSource, StreamOptions};
use crate::reader::{LineRead, ReaderState};
use crate::source::Source;
use producer::{Producer, ProducerConfig};
use ring::RingBuffer;
use sync::{Interrupt, Shared, StreamStatus};

/// Marks the producer as gone when its thread exits, including by panic.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.producer_exited = true;
        if thread::panicking() && state.status == StreamStatus::Running {
            state.status = StreamStatus::Failed(TextError::ReadFailure {
                path: String::new(),
                reason: "background reader panicked".to_string(),
            });
        }
        self.0.wake_consumer(&state);
    }
}

/// Line reader backed by a background decompression thread.
pub struct TextStream {
    shared: Option<Arc<Shared>>,
    producer: Option<JoinHandle<()>>,
    path: Option<PathBuf>,
    state: ReaderState,
    consume: usize,
    stop: usize,
    line: (usize, usize),
    line_idx: u64,
    max_line_blen: usize,
    returned_buffer: Option<Vec<u8>>,
}

impl Default for TextStream {
    fn default() -> Self {
        Self {
            shared: None,
            producer: None,
            path: None,
            state: ReaderState::Unopened,
            consume: 0,
            stop: 0,
            line: (0, 0),
            line_idx: 0,
            max_line_blen: 0,
            returned_buffer: None,
        }
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("line_idx", &self.line_idx)
            .finish_non_exhaustive()
    }
}

impl TextStream {
    /// A stream with no open file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` with default options.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, StreamOptions::default())
    }

    /// Open `path` with the given options.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn with_options<P: AsRef<Path>>(path: P, options: StreamOptions) -> Result<Self> {
        let mut stream = Self::new();
        stream.open(path, options)?;
        Ok(stream)
    }

    /// Open `path` and start the background reader, closing any open file first.
    ///
    /// The file is opened and its header checked on the calling thread, so
    /// open failures are reported here rather than by the first line request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter`, `OutOfMemory`, `OpenFailure` (also for a
    /// rejected compression header), `ReadFailure`, `DecompressFailure` or
    /// `ThreadCreateFailure`.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, mut options: StreamOptions) -> Result<()> {
        if self.shared.is_some() {
            if let Err(e) = self.cleanup() {
                warn!("Ignoring failure to close previous file: {e}");
            }
        }
        self.reset_cursors();
        self.path = None;
        self.state = ReaderState::Unopened;

        let path = path.as_ref();
        let validated = options.validate();
        let buffer = options.reader_mut().take_buffer();
        if let Err(e) = validated {
            return Err(self.fail_open(e, buffer));
        }
        let reader = options.reader();
        let ring = match buffer {
            BufferSource::Owned => match RingBuffer::owned(reader.initial_buffer_size()) {
                Ok(ring) => ring,
                Err(e) => return Err(self.fail_open(e, BufferSource::Owned)),
            },
            BufferSource::Provided(data) => RingBuffer::provided(data),
        };
        let source = match Source::open(path, reader.chunk_size()) {
            Ok(source) => source,
            Err(e) => return Err(self.fail_open(e, ring_buffer(ring))),
        };

        let compression = source.compression();
        let shared = Arc::new(Shared::new(ring, compression));
        let producer = Producer::new(
            Arc::clone(&shared),
            ProducerConfig {
                chunk_size: reader.chunk_size(),
                max_line_blen: reader.max_line_blen(),
                buffer_limit: reader.buffer_limit(),
                decompress_threads: options.decompress_threads(),
            },
        );
        let guard = ExitGuard(Arc::clone(&shared));
        let spawned = thread::Builder::new()
            .name("linestream-reader".to_string())
            .stack_size(thread_stack_size())
            .spawn(move || {
                let _guard = guard;
                producer.run(source);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let error = TextError::ThreadCreateFailure {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                let buffer = Arc::try_unwrap(shared)
                    .map_or(BufferSource::Owned, |shared| ring_buffer(shared.ring));
                return Err(self.fail_open(error, buffer));
            }
        };

        debug!(
            "Streaming {} ({compression}, {} decompression threads)",
            path.display(),
            if compression == FileCompression::Bgzf { options.decompress_threads() } else { 1 }
        );
        self.shared = Some(shared);
        self.producer = Some(handle);
        self.path = Some(path.to_path_buf());
        self.max_line_blen = reader.max_line_blen();
        self.state = ReaderState::Open;
        Ok(())
    }

    fn reset_cursors(&mut self) {
        self.consume = 0;
        self.stop = 0;
        self.line = (0, 0);
        self.line_idx = 0;
    }

    fn fail_open(&mut self, error: TextError, buffer: BufferSource) -> TextError {
        if let BufferSource::Provided(data) = buffer {
            self.returned_buffer = Some(data);
        }
        self.state = ReaderState::Failed(error.clone());
        error
    }

    fn fail(&mut self, error: TextError) -> TextError {
        self.consume = self.stop;
        self.line = (0, 0);
        self.state = ReaderState::Failed(error.clone());
        error
    }

    /// Fill in the consumer-side details of an error raised by the producer.
    fn localize(&self, error: TextError) -> TextError {
        let path = self.path.as_deref().unwrap_or(Path::new(""));
        match error {
            TextError::LongLine { max_line_blen, .. } => {
                TextError::long_line(path, self.line_idx + 1, max_line_blen)
            }
            TextError::ReadFailure { path: p, reason } if p.is_empty() => {
                TextError::ReadFailure { path: path.display().to_string(), reason }
            }
            other => other,
        }
    }

    /// The next line including its trailing `\n`, or `None` at end of file.
    ///
    /// Blocks while the background reader catches up.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` before a successful open, otherwise the sticky failure
    /// reported by the background reader or a `LongLine` found here.
    #[allow(unsafe_code)]
    pub fn next_line(&mut self) -> Result<Option<&[u8]>> {
        if self.consume == self.stop {
            match &self.state {
                ReaderState::Open => {}
                ReaderState::Eof => return Ok(None),
                ReaderState::Failed(e) => return Err(e.clone()),
                ReaderState::Unopened => return Err(TextError::NotOpen),
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => {
                    self.state = ReaderState::Eof;
                    debug!("Reached end of stream after {} lines", self.line_idx);
                    return Ok(None);
                }
                Err(e) => {
                    let error = self.localize(e);
                    return Err(self.fail(error));
                }
            }
        }

        let Some(shared) = &self.shared else {
            return Err(TextError::NotOpen);
        };
        let start = self.consume;
        // SAFETY: `consume..stop` was published by the producer, which does not
        // touch it until a later `advance` publishes a tail past it.
        let view = unsafe { shared.ring.slice(start, self.stop) };
        let end = memchr(b'\n', view).map_or(self.stop, |pos| start + pos + 1);
        self.consume = end;
        if end - start - 1 > self.max_line_blen {
            let error = TextError::long_line(
                self.path.as_deref().unwrap_or(Path::new("")),
                self.line_idx + 1,
                self.max_line_blen,
            );
            return Err(self.fail(error));
        }
        self.line_idx += 1;
        self.line = (start, end);
        Ok(Some(self.current_line()))
    }

    /// Publish everything consumed so far and wait for more lines.
    /// Returns `false` at end of file.
    fn advance(&mut self) -> Result<bool> {
        let Some(shared) = &self.shared else {
            return Err(TextError::NotOpen);
        };
        self.line = (0, 0);
        let mut state = shared.lock();
        state.consume_tail = self.consume;
        shared.wake_producer(&state);
        loop {
            self.consume = state.consume_tail;
            if state.wrapped && self.consume == state.cur_circular_end {
                state.wrapped = false;
                state.consume_tail = 0;
                self.consume = 0;
                shared.wake_producer(&state);
            }
            let end = if state.wrapped { state.cur_circular_end } else { state.available_end };
            if end > self.consume {
                self.stop = end;
                return Ok(true);
            }
            self.stop = self.consume;
            match &state.status {
                StreamStatus::Running => {}
                StreamStatus::Eof => return Ok(false),
                StreamStatus::Failed(e) => return Err(e.clone()),
            }
            if state.producer_exited {
                return Err(TextError::ReadFailure {
                    path: String::new(),
                    reason: "background reader exited".to_string(),
                });
            }
            shared.wait_for_producer(&mut state);
        }
    }

    /// The line most recently returned by [`next_line`](Self::next_line).
    ///
    /// Empty once the stream has had to wait for more input (at end of file,
    /// after an error, or after a retarget).
    #[must_use]
    #[allow(unsafe_code)]
    pub fn current_line(&self) -> &[u8] {
        let (start, end) = self.line;
        match &self.shared {
            // SAFETY: the line lies before `consume`, which has not been
            // published as the tail yet, so the producer cannot overwrite it.
            Some(shared) if end > start => unsafe { shared.ring.slice(start, end) },
            _ => &[],
        }
    }

    /// Switch to another file without restarting the background thread.
    ///
    /// Buffered lines of the previous file are discarded.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` if no file is open, or the error the background reader
    /// hit opening `path`; that error is also recorded as the sticky state.
    pub fn retarget<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let Some(shared) = self.shared.clone() else {
            return Err(TextError::NotOpen);
        };
        let path = path.as_ref().to_path_buf();
        self.line = (0, 0);

        let mut state = shared.lock();
        if state.producer_exited {
            drop(state);
            let error = self.localize(TextError::ReadFailure {
                path: String::new(),
                reason: "background reader exited".to_string(),
            });
            return Err(self.fail(error));
        }
        shared.interrupt(&mut state, Interrupt::Retarget(path.clone()));
        while state.interrupt != Interrupt::None && !state.producer_exited {
            shared.wait_for_producer(&mut state);
        }
        let status = state.status.clone();
        drop(state);

        self.reset_cursors();
        self.path = Some(path);
        match status {
            StreamStatus::Failed(e) => Err(self.fail(e)),
            _ => {
                debug!("Retargeted stream to {}", self.path.as_deref().unwrap_or(Path::new("")).display());
                self.state = ReaderState::Open;
                Ok(())
            }
        }
    }

    /// Restart from the first line of the current file.
    ///
    /// # Errors
    ///
    /// See [`retarget`](Self::retarget).
    pub fn rewind(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(TextError::NotOpen);
        };
        self.retarget(path)
    }

    /// Stop the background reader, close the file and release the buffer.
    /// Safe to call repeatedly.
    ///
    /// A recorded failure is kept; a provided buffer becomes available through
    /// [`take_buffer`](Self::take_buffer).
    ///
    /// # Errors
    ///
    /// Returns `CloseFailure` if the background thread panicked. It is recorded
    /// as the sticky state only when no earlier failure was recorded.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(shared) = self.shared.take() else {
            if !matches!(self.state, ReaderState::Failed(_)) {
                self.state = ReaderState::Unopened;
            }
            return Ok(());
        };
        {
            let mut state = shared.lock();
            shared.interrupt(&mut state, Interrupt::Shutdown);
        }
        let joined = self.producer.take().map_or(Ok(()), JoinHandle::join);
        if let Ok(shared) = Arc::try_unwrap(shared) {
            if let BufferSource::Provided(data) = ring_buffer(shared.ring) {
                self.returned_buffer = Some(data);
            }
        }

        let path = self.path.as_deref().unwrap_or(Path::new(""));
        debug!("Closed stream {} after {} lines", path.display(), self.line_idx);
        let result = match joined {
            Ok(()) => Ok(()),
            Err(_) => Err(TextError::CloseFailure {
                path: path.display().to_string(),
                reason: "background reader panicked".to_string(),
            }),
        };
        match (&result, &self.state) {
            (_, ReaderState::Failed(_)) => {}
            (Err(e), _) => self.state = ReaderState::Failed(e.clone()),
            (Ok(()), _) => self.state = ReaderState::Unopened,
        }
        self.consume = 0;
        self.stop = 0;
        self.line = (0, 0);
        result
    }

    /// Recover a caller-provided buffer after cleanup (or a failed open).
    pub fn take_buffer(&mut self) -> Option<Vec<u8>> {
        self.returned_buffer.take()
    }

    #[must_use]
    pub fn line_idx(&self) -> u64 {
        self.line_idx
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_some()
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.state == ReaderState::Eof
    }

    #[must_use]
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// The recorded failure, if any. End of file is not a failure.
    #[must_use]
    pub fn error(&self) -> Option<&TextError> {
        match &self.state {
            ReaderState::Failed(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn errcode(&self) -> Option<ErrorKind> {
        self.error().map(TextError::kind)
    }

    /// Compression format of the current file.
    #[must_use]
    pub fn compression(&self) -> Option<FileCompression> {
        self.shared.as_ref().and_then(|shared| shared.lock().compression)
    }

    /// Path of the current file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn ring_buffer(ring: RingBuffer) -> BufferSource {
    ring.into_provided().map_or(BufferSource::Owned, BufferSource::Provided)
}

impl LineRead for TextStream {
    fn next_line(&mut self) -> Result<Option<&[u8]>> {
        TextStream::next_line(self)
    }

    fn line_idx(&self) -> u64 {
        self.line_idx
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Error while closing text stream: {e}");
        }
    }
}
