//! Synchronous line reader.
//!
//! [`TextReader`] decodes on the calling thread: each refill asks the format
//! decoder for up to one chunk of text and splits it into lines in place. Lines
//! are handed out as slices into the reader's buffer (trailing `\n` included)
//! and stay valid until the next call that takes `&mut self`.
//!
//! A final line without a newline is terminated with a synthetic `\n`, so every
//! returned line ends in one. Carriage returns are left alone.
//!
//! # Example
//!
//! ```no_run
//! use linestream_lib::reader::TextReader;
//!
//! let mut reader = TextReader::from_path("calls.vcf.gz")?;
//! while let Some(line) = reader.next_line()? {
//!     if !line.starts_with(b"#") {
//!         // ...
//!     }
//! }
//! # Ok::<(), linestream_lib::errors::TextError>(())
//! ```

use std::path::Path;

use linestream_codec::FileCompression;
use log::{debug, warn};

use crate::buffer::LineBuffer;
use crate::errors::{ErrorKind, Result, TextError};
use crate::options::{BufferSource, ReaderOptions};
use crate::source::Source;

/// Line-at-a-time access shared by [`TextReader`] and
/// [`TextStream`](crate::stream::TextStream).
pub trait LineRead {
    /// The next line including its trailing `\n`, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns the (sticky) failure that stopped the reader.
    fn next_line(&mut self) -> Result<Option<&[u8]>>;

    /// Number of lines returned since the file was opened or rewound.
    fn line_idx(&self) -> u64;
}

/// Lifecycle of a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// No file has been opened, or the reader was cleaned up.
    Unopened,
    /// Lines may be available.
    Open,
    /// Every line has been returned.
    Eof,
    /// A failure occurred; it is returned by every later line request.
    Failed(TextError),
}

/// Single-threaded reader of plain, gzip, BGZF or Zstandard text.
#[derive(Debug)]
pub struct TextReader {
    source: Option<Source>,
    buf: Option<LineBuffer>,
    state: ReaderState,
    max_line_blen: usize,
    chunk_size: usize,
    buffer_limit: usize,
    line_idx: u64,
    line: (usize, usize),
    source_done: bool,
    returned_buffer: Option<Vec<u8>>,
}

impl Default for TextReader {
    fn default() -> Self {
        let options = ReaderOptions::default();
        Self {
            source: None,
            buf: None,
            state: ReaderState::Unopened,
            max_line_blen: options.max_line_blen(),
            chunk_size: options.chunk_size(),
            buffer_limit: options.buffer_limit(),
            line_idx: 0,
            line: (0, 0),
            source_done: false,
            returned_buffer: None,
        }
    }
}

impl TextReader {
    /// A reader with no open file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header is invalid.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, ReaderOptions::default())
    }

    /// Open `path` with the given options.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the file cannot be opened
    /// or its header is invalid.
    pub fn with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let mut reader = Self::new();
        reader.open(path, options)?;
        Ok(reader)
    }

    /// Open `path`, closing any file that is already open.
    ///
    /// On failure the reader is left not open and the error is also recorded as
    /// its sticky state; a provided buffer can be recovered with
    /// [`take_buffer`](Self::take_buffer).
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter`, `OutOfMemory`, `OpenFailure` (also for a
    /// rejected compression header), `ReadFailure` or `DecompressFailure` (if
    /// the decoder cannot be created).
    pub fn open<P: AsRef<Path>>(&mut self, path: P, mut options: ReaderOptions) -> Result<()> {
        if self.source.is_some() {
            if let Err(e) = self.cleanup() {
                warn!("Ignoring failure to close previous file: {e}");
            }
        }
        *self = Self { returned_buffer: self.returned_buffer.take(), ..Self::default() };

        let path = path.as_ref();
        let validated = options.validate();
        let buffer = options.take_buffer();
        if let Err(e) = validated {
            return Err(self.fail_open(e, buffer));
        }
        let owned_size = options.initial_buffer_size();
        let buf = match LineBuffer::from_source(buffer, owned_size) {
            Ok(buf) => buf,
            Err(e) => return Err(self.fail_open(e, BufferSource::Owned)),
        };
        let source = match Source::open(path, options.chunk_size()) {
            Ok(source) => source,
            Err(e) => {
                let buffer = buf.into_provided().map_or(BufferSource::Owned, BufferSource::Provided);
                return Err(self.fail_open(e, buffer));
            }
        };

        debug!(
            "Reading {} ({}, {} byte buffer, {})",
            path.display(),
            source.compression(),
            buf.capacity(),
            if buf.is_owned() { "owned" } else { "provided" }
        );
        self.max_line_blen = options.max_line_blen();
        self.chunk_size = options.chunk_size();
        self.buffer_limit = options.buffer_limit();
        self.source = Some(source);
        self.buf = Some(buf);
        self.state = ReaderState::Open;
        Ok(())
    }

    fn fail_open(&mut self, error: TextError, buffer: BufferSource) -> TextError {
        if let BufferSource::Provided(data) = buffer {
            self.returned_buffer = Some(data);
        }
        self.state = ReaderState::Failed(error.clone());
        error
    }

    fn fail(&mut self, error: TextError) -> TextError {
        if let Some(buf) = self.buf.as_mut() {
            buf.discard();
        }
        self.state = ReaderState::Failed(error.clone());
        error
    }

    /// The next line including its trailing `\n`, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` before a successful open, otherwise the sticky failure
    /// (`ReadFailure`, `DecompressFailure`, `LongLine` or `OutOfMemory`).
    pub fn next_line(&mut self) -> Result<Option<&[u8]>> {
        if self.buf.as_ref().is_none_or(LineBuffer::is_drained) {
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
                    debug!("Reached end of file after {} lines", self.line_idx);
                    return Ok(None);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        let Some((start, end)) = self.buf.as_mut().and_then(LineBuffer::take_line) else {
            return Ok(None);
        };
        if end - start - 1 > self.max_line_blen {
            let error = self.long_line();
            return Err(self.fail(error));
        }
        self.line_idx += 1;
        self.line = (start, end);
        Ok(Some(self.current_line()))
    }

    /// Refill the buffer until it holds at least one complete line.
    /// Returns `false` once the decoded stream is exhausted.
    fn advance(&mut self) -> Result<bool> {
        let (Some(source), Some(buf)) = (self.source.as_mut(), self.buf.as_mut()) else {
            return Err(TextError::NotOpen);
        };
        loop {
            if self.source_done {
                return Ok(false);
            }
            buf.compact();
            if buf.partial_len() > self.max_line_blen {
                return Err(TextError::long_line(source.path(), self.line_idx + 1, self.max_line_blen));
            }
            if buf.spare() < self.chunk_size {
                if buf.is_owned() {
                    buf.grow(self.chunk_size, self.buffer_limit)?;
                }
                if buf.spare() == 0 {
                    return Err(TextError::long_line(
                        source.path(),
                        self.line_idx + 1,
                        self.max_line_blen,
                    ));
                }
            }

            let n = source.read(buf.spare_mut(self.chunk_size))?;
            if n == 0 {
                self.source_done = true;
                if buf.partial_len() > 0 {
                    buf.terminate_partial();
                    return Ok(true);
                }
                return Ok(false);
            }
            if buf.commit(n) {
                return Ok(true);
            }
        }
    }

    fn long_line(&self) -> TextError {
        let path = self.source.as_ref().map_or(Path::new(""), Source::path);
        TextError::long_line(path, self.line_idx + 1, self.max_line_blen)
    }

    /// The line most recently returned by [`next_line`](Self::next_line).
    #[must_use]
    pub fn current_line(&self) -> &[u8] {
        let (start, end) = self.line;
        self.buf.as_ref().map_or(&[], |buf| buf.slice(start, end))
    }

    /// Number of lines returned since the file was opened or rewound.
    #[must_use]
    pub fn line_idx(&self) -> u64 {
        self.line_idx
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.source.is_some()
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

    /// Compression format of the open file.
    #[must_use]
    pub fn compression(&self) -> Option<FileCompression> {
        self.source.as_ref().map(Source::compression)
    }

    /// Current size of the line buffer in bytes (0 when not open).
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, LineBuffer::capacity)
    }

    /// Restart from the first line, clearing end of file and any recorded error.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` if no file is open, or `ReadFailure` if seeking fails.
    pub fn rewind(&mut self) -> Result<()> {
        let (Some(source), Some(buf)) = (self.source.as_mut(), self.buf.as_mut()) else {
            return Err(TextError::NotOpen);
        };
        if let Err(e) = source.rewind() {
            return Err(self.fail(e));
        }
        buf.reset();
        self.state = ReaderState::Open;
        self.line_idx = 0;
        self.line = (0, 0);
        self.source_done = false;
        Ok(())
    }

    /// Close the file and release the buffer. Safe to call repeatedly.
    ///
    /// A recorded failure is kept so it can still be inspected; otherwise the
    /// reader returns to the unopened state. A provided buffer becomes
    /// available through [`take_buffer`](Self::take_buffer).
    ///
    /// # Errors
    ///
    /// Dropping a read-only file cannot fail, so this currently always succeeds;
    /// the signature matches [`TextStream::cleanup`](crate::stream::TextStream::cleanup).
    #[allow(clippy::unnecessary_wraps)]
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(source) = self.source.take() {
            debug!("Closing {} after {} lines", source.path().display(), self.line_idx);
        }
        if let Some(data) = self.buf.take().and_then(LineBuffer::into_provided) {
            self.returned_buffer = Some(data);
        }
        if !matches!(self.state, ReaderState::Failed(_)) {
            self.state = ReaderState::Unopened;
        }
        self.line = (0, 0);
        self.source_done = false;
        Ok(())
    }

    /// Recover a caller-provided buffer after cleanup (or a failed open).
    pub fn take_buffer(&mut self) -> Option<Vec<u8>> {
        self.returned_buffer.take()
    }
}

impl LineRead for TextReader {
    fn next_line(&mut self) -> Result<Option<&[u8]>> {
        TextReader::next_line(self)
    }

    fn line_idx(&self) -> u64 {
        self.line_idx
    }
}
