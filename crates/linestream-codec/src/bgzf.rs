//! BGZF block splitting and decompression.
//!
//! BGZF (Blocked GZIP Format) is a series of gzip members, each holding at most
//! 64KB of uncompressed data and declaring its own compressed size in a `BC`
//! extra subfield:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                               │
//! │  - Magic: 0x1f 0x8b (gzip)                                      │
//! │  - Method: 0x08 (deflate)                                       │
//! │  - Flags: 0x04 (FEXTRA)                                         │
//! │  - MTIME, XFL, OS: 6 bytes                                      │
//! │  - XLEN: 2 bytes (= 6)                                          │
//! │  - Subfield: "BC" + len(2) + BSIZE(2)                           │
//! │    where BSIZE = total_block_size - 1                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Compressed data (deflate)                                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                                │
//! │  - CRC32: 4 bytes                                               │
//! │  - ISIZE: 4 bytes (uncompressed size)                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the block size is known from the header, the input can be split into
//! whole blocks before any decompression happens. [`take_raw_block`] does that
//! split; [`decompress_block_into`] decodes one block on any thread. The
//! sequential [`BgzfDecoder`] combines the two.

use libdeflater::Decompressor;

use crate::decoder::{Decode, Feed};
use crate::error::CodecError;
use crate::format::FileCompression;
use crate::input::RawInput;

// ============================================================================
// Constants
// ============================================================================

/// Size of the BGZF block header.
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block footer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest total size of one BGZF block, and largest uncompressed payload.
pub const BGZF_MAX_BLOCK_SIZE: usize = 65536;

/// BGZF EOF marker block (empty block signaling end of file).
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

// ============================================================================
// Block framing
// ============================================================================

/// Validate an 18-byte block header and return the total block size.
///
/// # Errors
///
/// Returns [`CodecError::Corrupt`] if the header is not a BGZF block header.
pub fn block_size(header: &[u8]) -> Result<usize, CodecError> {
    let corrupt = |reason: String| CodecError::corrupt(FileCompression::Bgzf, reason);
    if header.len() < BGZF_HEADER_SIZE {
        return Err(corrupt(format!("block header needs 18 bytes, got {}", header.len())));
    }
    if header[0] != 0x1f || header[1] != 0x8b {
        return Err(corrupt(format!(
            "invalid magic: expected 0x1f 0x8b, got 0x{:02x} 0x{:02x}",
            header[0], header[1]
        )));
    }
    if header[2] != 0x08 {
        return Err(corrupt(format!(
            "invalid compression method: expected 0x08, got 0x{:02x}",
            header[2]
        )));
    }
    if header[3] & 0x04 == 0 {
        return Err(corrupt("block missing FEXTRA flag".to_string()));
    }
    if header[12] != b'B' || header[13] != b'C' {
        return Err(corrupt(format!(
            "invalid subfield ID: expected 'BC', got '{}{}'",
            header[12] as char, header[13] as char
        )));
    }

    let block_size = usize::from(u16::from_le_bytes([header[16], header[17]])) + 1;
    if block_size < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return Err(corrupt(format!("block too small: {block_size} bytes")));
    }
    Ok(block_size)
}

fn footer_u32(block: &[u8], from_end: usize) -> u32 {
    let i = block.len() - from_end;
    u32::from_le_bytes([block[i], block[i + 1], block[i + 2], block[i + 3]])
}

/// Declared uncompressed size (ISIZE) of a complete block.
#[must_use]
pub fn uncompressed_size(block: &[u8]) -> usize {
    if block.len() < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return 0;
    }
    footer_u32(block, 4) as usize
}

/// Result of trying to split the next block off a [`RawInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSplit {
    /// A whole block was moved into the destination buffer.
    Block,
    /// The next block is not fully buffered yet.
    NeedMoreInput,
    /// The input ended cleanly on a block boundary.
    EndOfStream,
}

/// Move the next complete block from `input` into `dest` (replacing its contents).
///
/// EOF marker blocks are returned like any other block; they decode to nothing.
///
/// # Errors
///
/// Returns [`CodecError::Corrupt`] for an invalid header or
/// [`CodecError::Truncated`] if the source ends inside a block.
pub fn take_raw_block(input: &mut RawInput, dest: &mut Vec<u8>) -> Result<BlockSplit, CodecError> {
    let data = input.data();
    if data.is_empty() {
        return Ok(if input.is_eof() { BlockSplit::EndOfStream } else { BlockSplit::NeedMoreInput });
    }
    let needed = if data.len() < BGZF_HEADER_SIZE {
        BGZF_HEADER_SIZE
    } else {
        block_size(&data[..BGZF_HEADER_SIZE])?
    };
    if data.len() < needed {
        if input.is_eof() {
            return Err(CodecError::truncated(
                FileCompression::Bgzf,
                format!("block needs {needed} bytes, only {} remain", data.len()),
            ));
        }
        return Ok(BlockSplit::NeedMoreInput);
    }

    dest.clear();
    dest.try_reserve(needed)
        .map_err(|_| CodecError::OutOfMemory { what: "raw BGZF block", bytes: needed })?;
    dest.extend_from_slice(&data[..needed]);
    input.consume(needed);
    Ok(BlockSplit::Block)
}

/// Decompress one complete block into `output`, which is resized to exactly
/// the block's uncompressed size. The CRC32 is verified.
///
/// # Errors
///
/// Returns [`CodecError::Corrupt`] if inflation fails, the size disagrees with
/// ISIZE, or the CRC32 does not match.
pub fn decompress_block_into(
    block: &[u8],
    decompressor: &mut Decompressor,
    output: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let size = uncompressed_size(block);
    if size > BGZF_MAX_BLOCK_SIZE {
        return Err(CodecError::corrupt(
            FileCompression::Bgzf,
            format!("ISIZE {size} exceeds the 64KB block limit"),
        ));
    }
    output.clear();
    output
        .try_reserve(size)
        .map_err(|_| CodecError::OutOfMemory { what: "BGZF block output", bytes: size })?;
    output.resize(size, 0);
    decompress_block_slice(block, decompressor, output)
}

/// Decompress one complete block into `out`, whose length must equal the block's ISIZE.
fn decompress_block_slice(
    block: &[u8],
    decompressor: &mut Decompressor,
    out: &mut [u8],
) -> Result<(), CodecError> {
    if out.is_empty() {
        return Ok(());
    }
    let compressed = &block[BGZF_HEADER_SIZE..block.len() - BGZF_FOOTER_SIZE];
    let written = decompressor.deflate_decompress(compressed, out).map_err(|e| {
        CodecError::corrupt(FileCompression::Bgzf, format!("decompression failed: {e:?}"))
    })?;
    if written != out.len() {
        return Err(CodecError::corrupt(
            FileCompression::Bgzf,
            format!("block inflated to {written} bytes, ISIZE says {}", out.len()),
        ));
    }

    let expected_crc = footer_u32(block, 8);
    let actual_crc = crc32fast::hash(out);
    if expected_crc != actual_crc {
        return Err(CodecError::corrupt(
            FileCompression::Bgzf,
            format!(
                "CRC32 mismatch: expected 0x{expected_crc:08x}, got 0x{actual_crc:08x}, block_size={}, uncompressed_size={}",
                block.len(),
                out.len()
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// Sequential decoder
// ============================================================================

/// Block-at-a-time BGZF decoder.
///
/// Whole blocks are decoded straight into the caller's output when they fit;
/// otherwise the block is staged and handed out over several calls.
pub struct BgzfDecoder {
    decompressor: Decompressor,
    raw_block: Vec<u8>,
    staged: Vec<u8>,
    staged_pos: usize,
    block_ct: u64,
}

impl Default for BgzfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BgzfDecoder {
    /// Create a decoder positioned before the first block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decompressor: Decompressor::new(),
            raw_block: Vec::new(),
            staged: Vec::new(),
            staged_pos: 0,
            block_ct: 0,
        }
    }

    /// Number of blocks decoded so far (including empty ones).
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.block_ct
    }

    /// Bytes of the current block still waiting to be handed out.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len() - self.staged_pos
    }
}

impl Decode for BgzfDecoder {
    fn decode(&mut self, input: &mut RawInput, out: &mut [u8]) -> Result<Feed, CodecError> {
        loop {
            if out.is_empty() {
                return Ok(Feed::OutputFull);
            }
            if self.staged_len() > 0 {
                let n = self.staged_len().min(out.len());
                out[..n].copy_from_slice(&self.staged[self.staged_pos..self.staged_pos + n]);
                self.staged_pos += n;
                return Ok(Feed::Produced(n));
            }

            match take_raw_block(input, &mut self.raw_block)? {
                BlockSplit::Block => {}
                BlockSplit::NeedMoreInput => return Ok(Feed::NeedMoreInput),
                BlockSplit::EndOfStream => return Ok(Feed::EndOfStream),
            }
            self.block_ct += 1;

            let size = uncompressed_size(&self.raw_block);
            if size == 0 {
                continue;
            }
            if size <= out.len() {
                decompress_block_slice(&self.raw_block, &mut self.decompressor, &mut out[..size])?;
                return Ok(Feed::Produced(size));
            }
            decompress_block_into(&self.raw_block, &mut self.decompressor, &mut self.staged)?;
            self.staged_pos = 0;
        }
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.staged.clear();
        self.staged_pos = 0;
        self.block_ct = 0;
        Ok(())
    }

    fn compression(&self) -> FileCompression {
        FileCompression::Bgzf
    }
}
