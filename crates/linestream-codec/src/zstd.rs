//! Streaming Zstandard decoding.

use ::zstd::stream::raw::{Decoder as RawDecoder, InBuffer, Operation, OutBuffer};

use crate::decoder::{Decode, Feed};
use crate::error::CodecError;
use crate::format::FileCompression;
use crate::input::RawInput;

/// Decoder for a sequence of one or more Zstandard frames (skippable frames included).
pub struct ZstdDecoder {
    stream: RawDecoder<'static>,
    in_frame: bool,
}

impl ZstdDecoder {
    /// Create a decompression stream.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfMemory`] if libzstd cannot allocate its context.
    pub fn new() -> Result<Self, CodecError> {
        let stream = RawDecoder::new()
            .map_err(|_| CodecError::OutOfMemory { what: "zstd decompression context", bytes: 0 })?;
        Ok(Self { stream, in_frame: false })
    }
}

impl Decode for ZstdDecoder {
    fn decode(&mut self, input: &mut RawInput, out: &mut [u8]) -> Result<Feed, CodecError> {
        loop {
            if out.is_empty() {
                return Ok(Feed::OutputFull);
            }

            let (consumed, produced, hint) = {
                let mut src = InBuffer::around(input.data());
                let mut dst = OutBuffer::around(&mut *out);
                let hint = self
                    .stream
                    .run(&mut src, &mut dst)
                    .map_err(|e| CodecError::corrupt(FileCompression::Zstd, e.to_string()))?;
                (src.pos, dst.pos(), hint)
            };
            input.consume(consumed);

            // A zero hint means the current frame is fully decoded and flushed.
            if hint == 0 {
                self.in_frame = false;
            } else if consumed > 0 || produced > 0 {
                self.in_frame = true;
            }

            if produced > 0 {
                return Ok(Feed::Produced(produced));
            }
            if consumed > 0 {
                continue;
            }
            if !input.data().is_empty() {
                return Err(CodecError::corrupt(
                    FileCompression::Zstd,
                    "decoder made no progress on buffered input",
                ));
            }
            if !input.is_eof() {
                return Ok(Feed::NeedMoreInput);
            }
            if self.in_frame {
                return Err(CodecError::truncated(FileCompression::Zstd, "final frame incomplete"));
            }
            return Ok(Feed::EndOfStream);
        }
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.stream
            .reinit()
            .map_err(|e| CodecError::corrupt(FileCompression::Zstd, e.to_string()))?;
        self.in_frame = false;
        Ok(())
    }

    fn compression(&self) -> FileCompression {
        FileCompression::Zstd
    }
}
