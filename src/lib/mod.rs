#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: Buffer arithmetic moves between usize, u64 and f64 for sizes and rates
// - missing_*_doc: Documentation improvements tracked separately
// - needless_pass_by_value: Options are consumed by `open`
// - items_after_statements: Some test code uses late item declarations
// - match_same_arms: Sometimes clearer to list arms explicitly
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::match_same_arms,
    clippy::too_many_lines,
    clippy::redundant_closure_for_method_calls,
    clippy::struct_excessive_bools,
    clippy::map_unwrap_or,
    clippy::uninlined_format_args
)]

//! # linestream - line-at-a-time reading of compressed text
//!
//! Reads plain, gzip, BGZF and Zstandard text files one line at a time, close
//! to raw I/O speed. The compression format is detected from the first bytes of
//! the file.
//!
//! ## Readers
//!
//! - **[`reader::TextReader`]** - single-threaded; decodes inline as the buffer drains
//! - **[`stream::TextStream`]** - decompress-ahead; a background thread (and, for
//!   BGZF, a pool of block decoders) fills a ring buffer while lines are consumed
//!
//! Both implement [`LineRead`] and hand out lines as borrowed slices that end in
//! `\n`. A final line without a newline gets one appended. End of file and
//! failures are sticky: every later request returns the same outcome.
//!
//! ### Supporting modules
//!
//! - **[`options`]** - [`ReaderOptions`] and [`StreamOptions`] builders and size constants
//! - **[`validation`]** - parameter checks used when opening
//! - **[`errors`]** - [`TextError`] and its [`ErrorKind`]
//! - **[`logging`]** - formatting helpers and [`logging::OperationTimer`]
//! - **[`progress`]** - [`progress::ProgressTracker`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use linestream_lib::{LineRead, TextReader};
//!
//! # fn main() -> Result<(), linestream_lib::TextError> {
//! let mut reader = TextReader::from_path("calls.vcf.gz")?;
//! let mut header_lines = 0;
//! while let Some(line) = reader.next_line()? {
//!     if line.starts_with(b"#") {
//!         header_lines += 1;
//!     }
//! }
//! println!("{header_lines} header lines");
//! # Ok(())
//! # }
//! ```
//!
//! Bounding memory and supplying a buffer:
//!
//! ```no_run
//! use linestream_lib::{BufferSource, ReaderOptions, TextReader, TextError};
//!
//! # fn main() -> Result<(), TextError> {
//! let options = ReaderOptions::new()
//!     .with_max_line_blen(4 << 20)
//!     .with_buffer(BufferSource::Provided(Vec::with_capacity(5 << 20)));
//! let mut reader = TextReader::with_options("big.txt.zst", options)?;
//! while reader.next_line()?.is_some() {}
//! reader.cleanup()?;
//! let buffer = reader.take_buffer();
//! assert!(buffer.is_some());
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod errors;
pub mod logging;
pub mod options;
pub mod progress;
pub mod reader;
mod source;
pub mod stream;
pub mod validation;

pub use errors::{ErrorKind, Result, TextError};
pub use linestream_codec::FileCompression;
pub use options::{BufferSource, ReaderOptions, StreamOptions};
pub use reader::{LineRead, ReaderState, TextReader};
pub use stream::TextStream;
