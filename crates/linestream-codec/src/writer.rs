//! BGZF output, used to build block-compressed text files.
//!
//! Uses libdeflate (via the `bgzf` crate) for compression. Data is buffered up
//! to the block size, compressed into one block and written straight through to
//! the inner writer; [`BgzfBlockWriter::finish`] appends the EOF marker.

use std::io::{self, Write};

use ::bgzf::{CompressionLevel, Compressor as BgzfCompressor};

use crate::bgzf::BGZF_EOF;

/// Default uncompressed bytes per block (64KB minus header/footer headroom).
pub const DEFAULT_BLOCK_SIZE: usize = ::bgzf::BGZF_BLOCK_SIZE;

/// Streaming BGZF writer over any [`Write`].
pub struct BgzfBlockWriter<W: Write> {
    inner: W,
    /// Uncompressed bytes of the block being filled.
    buffer: Vec<u8>,
    /// Reused output buffer for one compressed block.
    compressed: Vec<u8>,
    compressor: BgzfCompressor,
    block_size: usize,
    block_ct: u64,
}

impl<W: Write> BgzfBlockWriter<W> {
    /// Create a writer with the default block size.
    ///
    /// `compression_level` is clamped to 1-12.
    ///
    /// # Errors
    ///
    /// Returns an error if the compression level is rejected by the `bgzf` crate.
    pub fn new(inner: W, compression_level: u32) -> io::Result<Self> {
        Self::with_block_size(inner, compression_level, DEFAULT_BLOCK_SIZE)
    }

    /// Create a writer that cuts blocks every `block_size` uncompressed bytes.
    ///
    /// `block_size` is clamped to `1..=DEFAULT_BLOCK_SIZE`; small blocks are
    /// useful for producing many-block fixtures.
    ///
    /// # Errors
    ///
    /// Returns an error if the compression level is rejected by the `bgzf` crate.
    pub fn with_block_size(inner: W, compression_level: u32, block_size: usize) -> io::Result<Self> {
        let level = u8::try_from(compression_level.clamp(1, 12)).unwrap_or(6);
        let level = CompressionLevel::new(level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e:?}")))?;
        let block_size = block_size.clamp(1, DEFAULT_BLOCK_SIZE);
        Ok(Self {
            inner,
            buffer: Vec::with_capacity(block_size),
            compressed: Vec::new(),
            compressor: BgzfCompressor::new(level),
            block_size,
            block_ct: 0,
        })
    }

    /// Number of data blocks written so far (the EOF marker is not counted).
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.block_ct
    }

    /// Compress the current buffer as one block and write it out.
    fn write_block(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.compressed.clear();
        self.compressor
            .compress(&self.buffer, &mut self.compressed)
            .map_err(|e| io::Error::other(format!("BGZF compression failed: {e}")))?;
        self.inner.write_all(&self.compressed)?;
        self.buffer.clear();
        self.block_ct += 1;
        Ok(())
    }

    /// Write any partial block and the EOF marker, returning the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or the final writes fail.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_block()?;
        self.inner.write_all(&BGZF_EOF)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for BgzfBlockWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut offset = 0;
        while offset < data.len() {
            let to_copy = (self.block_size - self.buffer.len()).min(data.len() - offset);
            self.buffer.extend_from_slice(&data[offset..offset + to_copy]);
            offset += to_copy;
            if self.buffer.len() >= self.block_size {
                self.write_block()?;
            }
        }
        Ok(data.len())
    }

    /// Flushes the inner writer only; a partial block stays buffered until it
    /// fills or [`finish`](BgzfBlockWriter::finish) is called.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::{BGZF_HEADER_SIZE, block_size};

    #[test]
    fn test_default_block_size() {
        assert_eq!(DEFAULT_BLOCK_SIZE, 65280);
    }

    #[test]
    fn test_small_blocks() {
        let mut writer = BgzfBlockWriter::with_block_size(Vec::new(), 1, 10).unwrap();
        writer.write_all(b"0123456789abcdefghij0123").unwrap();
        assert_eq!(writer.block_count(), 2);
        let out = writer.finish().unwrap();
        assert!(out.ends_with(&BGZF_EOF));

        let mut pos = 0;
        let mut blocks = 0;
        while pos < out.len() {
            pos += block_size(&out[pos..pos + BGZF_HEADER_SIZE]).unwrap();
            blocks += 1;
        }
        assert_eq!(pos, out.len());
        assert_eq!(blocks, 4);
    }

    #[test]
    fn test_empty_writes_only_eof() {
        let writer = BgzfBlockWriter::new(Vec::new(), 6).unwrap();
        assert_eq!(writer.finish().unwrap(), BGZF_EOF);
    }

    #[test]
    fn test_output_is_readable_by_bgzf_crate() {
        use std::io::Read;

        let mut writer = BgzfBlockWriter::with_block_size(Vec::new(), 6, 1000).unwrap();
        let text: Vec<u8> = (0..2_000).flat_map(|i| format!("{i}\n").into_bytes()).collect();
        writer.write_all(&text).unwrap();
        let out = writer.finish().unwrap();

        let mut reader = ::bgzf::Reader::new(&out[..]);
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, text);
    }
}
