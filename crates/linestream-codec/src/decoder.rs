//! The per-format decoder state machines behind one closed enum.
//!
//! A [`Decoder`] is selected once, from the file's leading bytes, and never
//! changes variant afterwards. Each call to [`Decode::decode`] pulls bytes from a
//! [`RawInput`] and writes decoded text into the caller's output slice, reporting
//! what happened as a [`Feed`].

use enum_dispatch::enum_dispatch;

use crate::bgzf::BgzfDecoder;
use crate::error::CodecError;
use crate::format::FileCompression;
use crate::gzip::{self, GzipDecoder};
use crate::input::RawInput;
use crate::zstd::ZstdDecoder;

/// Outcome of one [`Decode::decode`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// `n > 0` decoded bytes were written to the front of the output slice.
    Produced(usize),
    /// Nothing could be produced from the buffered input; refill it and retry.
    NeedMoreInput,
    /// The output slice has no room.
    OutputFull,
    /// Input is exhausted at a clean member/frame boundary; no output remains.
    EndOfStream,
}

/// Operations shared by every format decoder.
#[enum_dispatch]
pub trait Decode {
    /// Decode as much as fits into `out` from the bytes buffered in `input`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Corrupt`] for malformed data or failed checksums and
    /// [`CodecError::Truncated`] when the source ends mid-member.
    fn decode(&mut self, input: &mut RawInput, out: &mut [u8]) -> Result<Feed, CodecError>;

    /// Return to the state of a freshly created decoder (used on rewind/retarget).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfMemory`] if internal state cannot be recreated.
    fn reset(&mut self) -> Result<(), CodecError>;

    /// The format this decoder handles.
    fn compression(&self) -> FileCompression;
}

/// Pass-through decoder for uncompressed text.
#[derive(Debug, Default)]
pub struct PlainDecoder;

impl Decode for PlainDecoder {
    fn decode(&mut self, input: &mut RawInput, out: &mut [u8]) -> Result<Feed, CodecError> {
        if out.is_empty() {
            return Ok(Feed::OutputFull);
        }
        let data = input.data();
        if data.is_empty() {
            return Ok(if input.is_eof() { Feed::EndOfStream } else { Feed::NeedMoreInput });
        }
        let n = data.len().min(out.len());
        out[..n].copy_from_slice(&data[..n]);
        input.consume(n);
        Ok(Feed::Produced(n))
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn compression(&self) -> FileCompression {
        FileCompression::Plain
    }
}

/// One decoder per supported format.
#[enum_dispatch(Decode)]
pub enum Decoder {
    PlainDecoder,
    GzipDecoder,
    BgzfDecoder,
    ZstdDecoder,
}

impl Decoder {
    /// Create a decoder for a known format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfMemory`] if the codec context cannot be created.
    pub fn new(compression: FileCompression) -> Result<Self, CodecError> {
        Ok(match compression {
            FileCompression::Plain => PlainDecoder.into(),
            FileCompression::Gzip => GzipDecoder::new().into(),
            FileCompression::Bgzf => BgzfDecoder::new().into(),
            FileCompression::Zstd => ZstdDecoder::new()?.into(),
        })
    }

    /// Detect the format from the leading file bytes and create its decoder.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadHeader`] if the bytes carry gzip magic but a
    /// header no gzip reader accepts (unknown method, reserved flags).
    pub fn init(header: &[u8]) -> Result<Self, CodecError> {
        let compression = FileCompression::sniff(header);
        if matches!(compression, FileCompression::Gzip | FileCompression::Bgzf) {
            gzip::parse_header(header, compression)?;
        }
        Self::new(compression)
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Decoder").field(&self.compression()).finish()
    }
}
