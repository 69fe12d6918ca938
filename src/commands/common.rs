//! Options shared by the commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use linestream_lib::options::{DECOMPRESS_CHUNK_SIZE, DEFAULT_MAX_LINE_BLEN};
use linestream_lib::{LineRead, ReaderOptions, StreamOptions, TextReader, TextStream};
use linestream_thread::num_cpu;
use log::info;

/// Input file and reader selection.
#[derive(Args, Debug, Clone)]
pub struct ReadOptions {
    /// Input text file (plain, gzip, BGZF or Zstandard)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Decompress ahead on background threads instead of inline
    #[arg(long = "stream", default_value = "false")]
    pub stream: bool,

    /// Threads used to decode BGZF blocks with --stream (default: all CPUs)
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Longest line, in bytes, before reading fails
    #[arg(long = "max-line-blen", default_value_t = DEFAULT_MAX_LINE_BLEN)]
    pub max_line_blen: usize,

    /// Bytes read and decoded per step
    #[arg(long = "chunk-size", default_value_t = DECOMPRESS_CHUNK_SIZE)]
    pub chunk_size: usize,
}

impl ReadOptions {
    /// Checks that the input exists and the sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is missing or a size is out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            bail!("Input file does not exist: {}", self.input.display());
        }
        if self.threads == Some(0) {
            bail!("--threads must be at least 1");
        }
        self.stream_options().validate()?;
        Ok(())
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions::new()
            .with_max_line_blen(self.max_line_blen)
            .with_chunk_size(self.chunk_size)
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions::new()
            .with_reader_options(self.reader_options())
            .with_decompress_threads(self.threads.unwrap_or_else(num_cpu))
    }

    /// Opens the input with the selected reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header is invalid.
    pub fn open(&self) -> Result<Box<dyn LineRead>> {
        let reader: Box<dyn LineRead> = if self.stream {
            let options = self.stream_options();
            info!("Decompress-ahead reader with {} decode thread(s)", options.decompress_threads());
            Box::new(TextStream::with_options(&self.input, options)?)
        } else {
            Box::new(TextReader::with_options(&self.input, self.reader_options())?)
        };
        Ok(reader)
    }

    /// A short label for log messages.
    pub fn describe(&self) -> String {
        self.input.display().to_string()
    }
}

/// Opens `options.input`, attaching the path to any error.
///
/// # Errors
///
/// See [`ReadOptions::open`].
pub fn open_input(options: &ReadOptions) -> Result<Box<dyn LineRead>> {
    options.validate()?;
    options.open().with_context(|| format!("Failed to open {}", options.describe()))
}
