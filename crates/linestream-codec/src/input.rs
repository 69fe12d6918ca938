//! Raw (still compressed) input staging shared by all decoders.

use std::io::{self, Read};

use crate::error::CodecError;

/// Smallest raw input capacity: one maximal BGZF block must always fit.
pub const MIN_INPUT_CAPACITY: usize = crate::bgzf::BGZF_MAX_BLOCK_SIZE;

/// A fixed-capacity window of raw bytes read from the source.
///
/// Decoders take bytes from the front with [`data`](Self::data) and
/// [`consume`](Self::consume); the owner tops the window up with
/// [`refill`](Self::refill) whenever a decoder reports it needs more input.
#[derive(Debug)]
pub struct RawInput {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
}

impl RawInput {
    /// Allocate a window of at least `capacity` bytes (never below [`MIN_INPUT_CAPACITY`]).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfMemory`] if the buffer cannot be allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self, CodecError> {
        let capacity = capacity.max(MIN_INPUT_CAPACITY);
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| CodecError::OutOfMemory { what: "raw input buffer", bytes: capacity })?;
        buf.resize(capacity, 0);
        Ok(Self { buf, start: 0, end: 0, eof: false })
    }

    /// Unconsumed raw bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Mark `n` bytes at the front of [`data`](Self::data) as consumed.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.end - self.start);
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// True once the source has reported end of file.
    #[inline]
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// True when the source is at end of file and every byte has been consumed.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.eof && self.start == self.end
    }

    /// True if the window holds no free space for another read.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end == self.buf.len()
    }

    /// Capacity of the window.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Move unconsumed bytes to the front and read once from `reader`.
    ///
    /// Returns the number of bytes added; `Ok(0)` means either end of file
    /// (then [`is_eof`](Self::is_eof) becomes true) or a full window.
    ///
    /// # Errors
    ///
    /// Propagates read errors from `reader` (interrupted reads are retried).
    pub fn refill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.buf.len() {
            return Ok(0);
        }
        loop {
            match reader.read(&mut self.buf[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.end += n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Read until at least `n` bytes are buffered or the source ends.
    ///
    /// Used to gather the header bytes needed for format detection.
    ///
    /// # Errors
    ///
    /// Propagates read errors from `reader`.
    pub fn fill_at_least<R: Read + ?Sized>(&mut self, reader: &mut R, n: usize) -> io::Result<()> {
        while self.end - self.start < n && !self.eof && !self.is_full() {
            self.refill(reader)?;
        }
        Ok(())
    }

    /// Forget all buffered bytes and the end-of-file flag.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
        self.eof = false;
    }
}
