#![deny(unsafe_code)]

//! Format decoders for line-oriented text files.
//!
//! This crate turns raw file bytes into decoded text for four formats:
//! - [`format`] - detection of plain, gzip, BGZF and Zstandard input from leading bytes
//! - [`input`] - [`RawInput`], the raw byte window every decoder reads from
//! - [`decoder`] - the [`Decoder`] enum and the [`Decode`] step contract
//! - [`gzip`], [`bgzf`], [`zstd`] - the per-format state machines
//! - [`writer`] - a BGZF writer for producing block-compressed files

pub mod bgzf;
pub mod decoder;
pub mod error;
pub mod format;
pub mod gzip;
pub mod input;
pub mod writer;
pub mod zstd;

// Re-export commonly used types
pub use decoder::{Decode, Decoder, Feed, PlainDecoder};
pub use error::CodecError;
pub use format::{FileCompression, SNIFF_LEN};
pub use input::RawInput;
pub use writer::BgzfBlockWriter;
