//! An open file paired with its raw input window and format decoder.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use linestream_codec::bgzf::{BlockSplit, take_raw_block};
use linestream_codec::{Decode, Decoder, Feed, FileCompression, RawInput, SNIFF_LEN};
use log::debug;

use crate::errors::{Result, TextError};

/// Decoded text source for one file.
#[derive(Debug)]
pub(crate) struct Source {
    path: PathBuf,
    file: File,
    input: RawInput,
    decoder: Decoder,
}

impl Source {
    /// Open `path`, sniff its format from the first bytes and build a decoder.
    /// A header the decoder rejects is reported as `OpenFailure`.
    pub(crate) fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| TextError::open(path, &e))?;
        let mut input =
            RawInput::with_capacity(chunk_size).map_err(|e| TextError::from_codec(path, e))?;
        input.fill_at_least(&mut file, SNIFF_LEN).map_err(|e| TextError::read(path, &e))?;
        let decoder = Decoder::init(input.data()).map_err(|e| TextError::from_header(path, e))?;
        debug!("Opened {} as {}", path.display(), decoder.compression());
        Ok(Self { path: path.to_path_buf(), file, input, decoder })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn compression(&self) -> FileCompression {
        self.decoder.compression()
    }

    /// Decode into `out`, returning the number of bytes written; `Ok(0)` means
    /// the stream ended. `out` must not be empty.
    pub(crate) fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        debug_assert!(!out.is_empty());
        loop {
            match self.decoder.decode(&mut self.input, out) {
                Ok(Feed::Produced(n)) => return Ok(n),
                Ok(Feed::EndOfStream) => return Ok(0),
                Ok(Feed::NeedMoreInput) => self.refill()?,
                Ok(Feed::OutputFull) => {
                    return Err(self.stalled("decoder reported a full output buffer"));
                }
                Err(e) => return Err(TextError::from_codec(&self.path, e)),
            }
        }
    }

    /// Move the next raw BGZF block into `dest`. Returns `false` at end of file.
    pub(crate) fn next_raw_block(&mut self, dest: &mut Vec<u8>) -> Result<bool> {
        loop {
            match take_raw_block(&mut self.input, dest) {
                Ok(BlockSplit::Block) => return Ok(true),
                Ok(BlockSplit::EndOfStream) => return Ok(false),
                Ok(BlockSplit::NeedMoreInput) => self.refill()?,
                Err(e) => return Err(TextError::from_codec(&self.path, e)),
            }
        }
    }

    /// True once every raw byte of the file has been handed out.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.input.is_exhausted()
    }

    /// Seek back to the start of the file and reset the decoder.
    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| TextError::read(&self.path, &e))?;
        self.input.reset();
        self.decoder.reset().map_err(|e| TextError::from_codec(&self.path, e))?;
        debug!("Rewound {}", self.path.display());
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        let read = self.input.refill(&mut self.file).map_err(|e| TextError::read(&self.path, &e))?;
        if read == 0 && !self.input.is_eof() {
            return Err(self.stalled("input window is full but the decoder needs more bytes"));
        }
        Ok(())
    }

    fn stalled(&self, reason: &str) -> TextError {
        TextError::DecompressFailure {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
