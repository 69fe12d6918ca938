//! Line buffer for the synchronous reader.
//!
//! Layout of the backing storage:
//!
//! ```text
//! 0        consume          stop            fill          capacity
//! |  done  |  complete lines  |  partial line  |   free     |
//! ```
//!
//! `stop` is one past the last newline in the filled region, so every byte in
//! `consume..stop` belongs to a complete line.

use memchr::{memchr, memrchr};

use crate::errors::{Result, TextError};
use crate::options::BufferSource;

#[derive(Debug)]
pub(crate) struct LineBuffer {
    data: Vec<u8>,
    owned: bool,
    consume: usize,
    stop: usize,
    fill: usize,
}

impl LineBuffer {
    /// Allocate a library-owned buffer of `size` bytes.
    pub(crate) fn owned(size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| TextError::out_of_memory("line buffer", size))?;
        data.resize(size, 0);
        Ok(Self { data, owned: true, consume: 0, stop: 0, fill: 0 })
    }

    /// Wrap a caller buffer; its whole capacity is used and never reallocated.
    pub(crate) fn provided(mut data: Vec<u8>) -> Self {
        data.resize(data.capacity(), 0);
        Self { data, owned: false, consume: 0, stop: 0, fill: 0 }
    }

    pub(crate) fn from_source(source: BufferSource, owned_size: usize) -> Result<Self> {
        match source {
            BufferSource::Owned => Self::owned(owned_size),
            BufferSource::Provided(data) => Ok(Self::provided(data)),
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owned
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes of the trailing partial line.
    pub(crate) fn partial_len(&self) -> usize {
        self.fill - self.stop
    }

    /// True when no complete line remains.
    pub(crate) fn is_drained(&self) -> bool {
        self.consume == self.stop
    }

    pub(crate) fn spare(&self) -> usize {
        self.data.len() - self.fill
    }

    /// Free space after the filled region, at most `limit` bytes.
    pub(crate) fn spare_mut(&mut self, limit: usize) -> &mut [u8] {
        let end = self.fill + limit.min(self.spare());
        &mut self.data[self.fill..end]
    }

    /// Mark `n` bytes written through [`spare_mut`](Self::spare_mut) as filled,
    /// moving `stop` past the last newline among them.
    pub(crate) fn commit(&mut self, n: usize) -> bool {
        let start = self.fill;
        self.fill += n;
        match memrchr(b'\n', &self.data[start..self.fill]) {
            Some(pos) => {
                self.stop = start + pos + 1;
                true
            }
            None => false,
        }
    }

    /// Terminate the partial line with a newline; the caller guarantees a free byte.
    pub(crate) fn terminate_partial(&mut self) {
        self.data[self.fill] = b'\n';
        self.fill += 1;
        self.stop = self.fill;
    }

    /// Move the partial line to the front of the buffer. Only valid once drained.
    pub(crate) fn compact(&mut self) {
        debug_assert!(self.is_drained());
        if self.stop > 0 {
            self.data.copy_within(self.stop..self.fill, 0);
            self.fill -= self.stop;
            self.consume = 0;
            self.stop = 0;
        }
    }

    /// Grow an owned buffer so that at least `min_spare` bytes are free,
    /// doubling where possible but never beyond `limit`.
    pub(crate) fn grow(&mut self, min_spare: usize, limit: usize) -> Result<()> {
        debug_assert!(self.owned);
        let cap = self.data.len();
        let new_cap = (2 * cap).max(self.fill + min_spare).min(limit);
        if new_cap <= cap {
            return Ok(());
        }
        self.data
            .try_reserve_exact(new_cap - cap)
            .map_err(|_| TextError::out_of_memory("line buffer", new_cap))?;
        self.data.resize(new_cap, 0);
        Ok(())
    }

    /// Split off the next complete line, newline included. Returns its range.
    pub(crate) fn take_line(&mut self) -> Option<(usize, usize)> {
        if self.is_drained() {
            return None;
        }
        let start = self.consume;
        let end = memchr(b'\n', &self.data[start..self.stop]).map_or(self.stop, |pos| start + pos + 1);
        self.consume = end;
        Some((start, end))
    }

    /// Drop every buffered line and partial line.
    pub(crate) fn discard(&mut self) {
        self.consume = self.stop;
    }

    pub(crate) fn reset(&mut self) {
        self.consume = 0;
        self.stop = 0;
        self.fill = 0;
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.data[start..end]
    }

    /// Hand back a caller-provided buffer; owned storage is dropped.
    pub(crate) fn into_provided(self) -> Option<Vec<u8>> {
        (!self.owned).then_some(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_with(buf: &mut LineBuffer, text: &[u8]) -> bool {
        buf.spare_mut(text.len())[..text.len()].copy_from_slice(text);
        buf.commit(text.len())
    }

    #[test]
    fn test_lines_and_partial() {
        let mut buf = LineBuffer::owned(64).unwrap();
        assert!(fill_with(&mut buf, b"ab\ncd\nef"));
        assert_eq!(buf.take_line(), Some((0, 3)));
        assert_eq!(buf.take_line(), Some((3, 6)));
        assert_eq!(buf.take_line(), None);
        assert_eq!(buf.partial_len(), 2);

        buf.compact();
        assert_eq!(buf.slice(0, 2), b"ef");
        assert!(!fill_with(&mut buf, b"gh"));
        assert!(fill_with(&mut buf, b"\n"));
        assert_eq!(buf.take_line(), Some((0, 5)));
        assert_eq!(buf.slice(0, 5), b"efgh\n");
    }

    #[test]
    fn test_terminate_partial() {
        let mut buf = LineBuffer::owned(16).unwrap();
        fill_with(&mut buf, b"tail");
        buf.terminate_partial();
        assert_eq!(buf.take_line(), Some((0, 5)));
        assert_eq!(buf.slice(0, 5), b"tail\n");
    }

    #[test]
    fn test_grow_is_capped() {
        let mut buf = LineBuffer::owned(16).unwrap();
        fill_with(&mut buf, &[b'x'; 16]);
        buf.grow(16, 24).unwrap();
        assert_eq!(buf.capacity(), 24);
        buf.grow(16, 24).unwrap();
        assert_eq!(buf.capacity(), 24);
    }

    #[test]
    fn test_provided_uses_full_capacity() {
        let vec = Vec::with_capacity(100);
        let ptr = vec.as_ptr();
        let buf = LineBuffer::provided(vec);
        assert!(!buf.is_owned());
        assert!(buf.capacity() >= 100);
        let back = buf.into_provided().unwrap();
        assert_eq!(back.as_ptr(), ptr);
    }
}
