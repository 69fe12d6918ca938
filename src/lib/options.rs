//! Reader and stream configuration.

use std::fmt;

use linestream_thread::num_cpu;

use crate::errors::Result;
use crate::validation::{validate_buffer, validate_chunk_size, validate_max_line_blen};

/// Bytes of decoded text requested from the decoder per refill.
pub const DECOMPRESS_CHUNK_SIZE: usize = 1 << 20;

/// Smallest permitted chunk size.
pub const MIN_CHUNK_SIZE: usize = 4096;

/// Smallest permitted maximum line length.
pub const MIN_MAX_LINE_BLEN: usize = 1 << 20;

/// Default maximum line length: effectively unbounded, so long lines surface
/// as allocation failures only on machines that cannot hold them.
pub const DEFAULT_MAX_LINE_BLEN: usize = 0x7fff_ffc0;

/// Suggested upper bound for a single whitespace-delimited token read from a line.
pub const MAX_TOKEN_BLEN: usize = 8 * DECOMPRESS_CHUNK_SIZE;

/// Who owns the line buffer.
#[derive(Clone, Default)]
pub enum BufferSource {
    /// The library allocates the buffer and grows it as needed.
    #[default]
    Owned,
    /// A caller buffer used as-is: its full capacity is the buffer size and it
    /// is never reallocated. It can be recovered after cleanup with `take_buffer()`.
    Provided(Vec<u8>),
}

impl fmt::Debug for BufferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned => f.write_str("Owned"),
            Self::Provided(buf) => write!(f, "Provided({} bytes)", buf.capacity()),
        }
    }
}

/// Options for [`TextReader`](crate::reader::TextReader).
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    max_line_blen: usize,
    buffer: BufferSource,
    chunk_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_line_blen: DEFAULT_MAX_LINE_BLEN,
            buffer: BufferSource::Owned,
            chunk_size: DECOMPRESS_CHUNK_SIZE,
        }
    }
}

impl ReaderOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest line (excluding its newline) accepted before `LongLine` is reported.
    #[must_use]
    pub fn with_max_line_blen(mut self, max_line_blen: usize) -> Self {
        self.max_line_blen = max_line_blen;
        self
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: BufferSource) -> Self {
        self.buffer = buffer;
        self
    }

    /// Decoded bytes requested per refill. Mostly useful for tests and tuning.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn max_line_blen(&self) -> usize {
        self.max_line_blen
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn buffer(&self) -> &BufferSource {
        &self.buffer
    }

    /// Largest size a library-owned buffer may grow to.
    #[must_use]
    pub fn buffer_limit(&self) -> usize {
        self.max_line_blen.saturating_add(self.chunk_size)
    }

    /// Initial size of a library-owned buffer.
    #[must_use]
    pub fn initial_buffer_size(&self) -> usize {
        (2 * self.chunk_size).min(self.buffer_limit())
    }

    pub(crate) fn take_buffer(&mut self) -> BufferSource {
        std::mem::take(&mut self.buffer)
    }

    /// Check every option against its floor and against each other.
    ///
    /// # Errors
    ///
    /// Returns `TextError::InvalidParameter` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        validate_max_line_blen(self.max_line_blen)?;
        validate_chunk_size(self.chunk_size, self.max_line_blen)?;
        if let BufferSource::Provided(buf) = &self.buffer {
            validate_buffer(buf.capacity(), self.chunk_size, self.max_line_blen)?;
        }
        Ok(())
    }
}

/// Options for [`TextStream`](crate::stream::TextStream).
#[derive(Debug, Clone)]
pub struct StreamOptions {
    reader: ReaderOptions,
    decompress_threads: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self { reader: ReaderOptions::default(), decompress_threads: num_cpu() }
    }
}

impl StreamOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reader_options(mut self, reader: ReaderOptions) -> Self {
        self.reader = reader;
        self
    }

    /// Worker threads used to decompress BGZF input. Other formats always use
    /// one background thread. Values below 2 disable parallel BGZF decoding.
    #[must_use]
    pub fn with_decompress_threads(mut self, decompress_threads: usize) -> Self {
        self.decompress_threads = decompress_threads;
        self
    }

    #[must_use]
    pub fn reader(&self) -> &ReaderOptions {
        &self.reader
    }

    pub(crate) fn reader_mut(&mut self) -> &mut ReaderOptions {
        &mut self.reader
    }

    #[must_use]
    pub fn decompress_threads(&self) -> usize {
        self.decompress_threads
    }

    /// # Errors
    ///
    /// Returns `TextError::InvalidParameter` if the reader options are invalid.
    pub fn validate(&self) -> Result<()> {
        self.reader.validate()
    }
}
