//! Streaming gzip decoding over raw deflate.
//!
//! Members are parsed by hand (header, deflate body, CRC32/ISIZE trailer) so a
//! file made of several concatenated members decodes as one stream, and every
//! member's trailer is verified.

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};
use log::debug;

use crate::decoder::{Decode, Feed};
use crate::error::CodecError;
use crate::format::FileCompression;
use crate::input::RawInput;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const FRESERVED: u8 = 0xe0;

const FIXED_HEADER_SIZE: usize = 10;
const TRAILER_SIZE: usize = 8;

/// Parse a gzip member header at the start of `data`.
///
/// Returns `Ok(Some(len))` with the header length when it is complete,
/// `Ok(None)` when more bytes are needed.
///
/// # Errors
///
/// Returns [`CodecError::BadHeader`] (tagged with `format`) for wrong magic,
/// a compression method other than deflate, or reserved flag bits.
pub fn parse_header(data: &[u8], format: FileCompression) -> Result<Option<usize>, CodecError> {
    if data.len() >= 2 && (data[0] != 0x1f || data[1] != 0x8b) {
        return Err(CodecError::bad_header(
            format,
            format!("expected magic 0x1f 0x8b, got 0x{:02x} 0x{:02x}", data[0], data[1]),
        ));
    }
    if data.len() >= 3 && data[2] != 0x08 {
        return Err(CodecError::bad_header(
            format,
            format!("unsupported compression method 0x{:02x}", data[2]),
        ));
    }
    if data.len() >= 4 && data[3] & FRESERVED != 0 {
        return Err(CodecError::bad_header(format, format!("reserved flags set: 0x{:02x}", data[3])));
    }
    if data.len() < FIXED_HEADER_SIZE {
        return Ok(None);
    }

    let flags = data[3];
    let mut pos = FIXED_HEADER_SIZE;
    if flags & FEXTRA != 0 {
        if data.len() < pos + 2 {
            return Ok(None);
        }
        pos += 2 + usize::from(u16::from_le_bytes([data[pos], data[pos + 1]]));
    }
    for field in [FNAME, FCOMMENT] {
        if flags & field != 0 {
            let Some(rest) = data.get(pos..) else { return Ok(None) };
            match memchr::memchr(0, rest) {
                Some(nul) => pos += nul + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }
    Ok((data.len() >= pos).then_some(pos))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    Header,
    Body,
    Trailer,
}

/// Decoder for (possibly multi-member) gzip streams.
pub struct GzipDecoder {
    inflate: Decompress,
    state: MemberState,
    crc: Hasher,
    member_size: u32,
    member_ct: u64,
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GzipDecoder {
    /// Create a decoder positioned before the first member header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflate: Decompress::new(false),
            state: MemberState::Header,
            crc: Hasher::new(),
            member_size: 0,
            member_ct: 0,
        }
    }

    /// Number of members fully decoded and verified so far.
    #[must_use]
    pub fn member_count(&self) -> u64 {
        self.member_ct
    }

    fn truncated(&self, what: &str) -> CodecError {
        CodecError::truncated(
            FileCompression::Gzip,
            format!("{what} of member {} incomplete", self.member_ct + 1),
        )
    }

    fn start_member(&mut self) {
        self.inflate.reset(false);
        self.crc = Hasher::new();
        self.member_size = 0;
        self.state = MemberState::Header;
    }

    /// Parse the next member header. Returns the feed to report, or `None` to keep decoding.
    fn read_header(&mut self, input: &mut RawInput) -> Result<Option<Feed>, CodecError> {
        let data = input.data();
        if data.is_empty() && input.is_eof() {
            return if self.member_ct > 0 {
                Ok(Some(Feed::EndOfStream))
            } else {
                Err(self.truncated("header"))
            };
        }
        if self.member_ct > 0 && is_trailing_data(data, input.is_eof()) {
            debug!("Ignoring {} bytes of trailing data after gzip member {}", data.len(), self.member_ct);
            let n = data.len();
            input.consume(n);
            return Ok(Some(if input.is_eof() { Feed::EndOfStream } else { Feed::NeedMoreInput }));
        }
        match parse_header(data, FileCompression::Gzip)? {
            Some(len) => {
                input.consume(len);
                self.state = MemberState::Body;
                Ok(None)
            }
            None if input.is_eof() => Err(self.truncated("header")),
            None if input.is_full() => Err(CodecError::corrupt(
                FileCompression::Gzip,
                "member header does not fit in the input buffer",
            )),
            None => Ok(Some(Feed::NeedMoreInput)),
        }
    }

    fn read_trailer(&mut self, input: &mut RawInput) -> Result<Option<Feed>, CodecError> {
        let data = input.data();
        if data.len() < TRAILER_SIZE {
            return if input.is_eof() {
                Err(self.truncated("trailer"))
            } else {
                Ok(Some(Feed::NeedMoreInput))
            };
        }
        let expected_crc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let expected_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let actual_crc = std::mem::replace(&mut self.crc, Hasher::new()).finalize();
        if expected_crc != actual_crc {
            return Err(CodecError::corrupt(
                FileCompression::Gzip,
                format!("CRC32 mismatch: expected 0x{expected_crc:08x}, got 0x{actual_crc:08x}"),
            ));
        }
        if expected_size != self.member_size {
            return Err(CodecError::corrupt(
                FileCompression::Gzip,
                format!("ISIZE mismatch: expected {expected_size}, got {}", self.member_size),
            ));
        }
        input.consume(TRAILER_SIZE);
        self.member_ct += 1;
        self.start_member();
        Ok(None)
    }
}

/// Whether the bytes after a complete member cannot start another member:
/// they lack the gzip magic, or end the file before the magic is complete.
fn is_trailing_data(data: &[u8], at_eof: bool) -> bool {
    match data {
        [] => false,
        [0x1f] => at_eof,
        [0x1f, 0x8b, ..] => false,
        _ => true,
    }
}

impl Decode for GzipDecoder {
    fn decode(&mut self, input: &mut RawInput, out: &mut [u8]) -> Result<Feed, CodecError> {
        loop {
            match self.state {
                MemberState::Header => {
                    if let Some(feed) = self.read_header(input)? {
                        return Ok(feed);
                    }
                }
                MemberState::Trailer => {
                    if let Some(feed) = self.read_trailer(input)? {
                        return Ok(feed);
                    }
                }
                MemberState::Body => {
                    if out.is_empty() {
                        return Ok(Feed::OutputFull);
                    }
                    let before_in = self.inflate.total_in();
                    let before_out = self.inflate.total_out();
                    let status = self
                        .inflate
                        .decompress(input.data(), out, FlushDecompress::None)
                        .map_err(|e| CodecError::corrupt(FileCompression::Gzip, e.to_string()))?;
                    // Both deltas are bounded by the slice lengths passed in.
                    let consumed = (self.inflate.total_in() - before_in) as usize;
                    let produced = (self.inflate.total_out() - before_out) as usize;
                    input.consume(consumed);

                    if produced > 0 {
                        self.crc.update(&out[..produced]);
                        self.member_size = self.member_size.wrapping_add(produced as u32);
                    }
                    if status == Status::StreamEnd {
                        self.state = MemberState::Trailer;
                    }
                    if produced > 0 {
                        return Ok(Feed::Produced(produced));
                    }
                    if consumed == 0 && status != Status::StreamEnd {
                        if input.is_eof() {
                            return Err(self.truncated("deflate stream"));
                        }
                        return Ok(Feed::NeedMoreInput);
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.start_member();
        self.member_ct = 0;
        Ok(())
    }

    fn compression(&self) -> FileCompression {
        FileCompression::Gzip
    }
}
