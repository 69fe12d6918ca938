//! Error types for text reading operations.
//!
//! End of file is not an error: line accessors return `Ok(None)` once the input
//! is exhausted. Every failure below is sticky on the reader or stream that
//! produced it, which is why [`TextError`] is `Clone`.

use std::path::Path;

use linestream_codec::CodecError;
use thiserror::Error;

/// Result type alias for text reading operations
pub type Result<T> = std::result::Result<T, TextError>;

/// Discriminant of a [`TextError`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    OpenFailure,
    ReadFailure,
    DecompressFailure,
    LongLine,
    CloseFailure,
    ThreadCreateFailure,
    InvalidParameter,
    NotOpen,
}

/// Error type for text reading operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextError {
    /// A buffer could not be allocated
    #[error("Out of memory allocating {bytes} bytes for {what}")]
    OutOfMemory {
        /// What was being allocated
        what: String,
        /// Requested size in bytes
        bytes: usize,
    },

    /// The file could not be opened
    #[error("Failed to open '{path}': {reason}")]
    OpenFailure {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Reading raw bytes from the file failed
    #[error("Failed to read '{path}': {reason}")]
    ReadFailure {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// The compressed stream is corrupt, truncated or unsupported
    #[error("Failed to decompress '{path}': {reason}")]
    DecompressFailure {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A line exceeded the configured maximum length
    #[error("Line {line_idx} of '{path}' is longer than {max_line_blen} bytes")]
    LongLine {
        /// Path to the file
        path: String,
        /// 1-based index of the offending line
        line_idx: u64,
        /// The configured maximum line length
        max_line_blen: usize,
    },

    /// Releasing the file or its background reader failed
    #[error("Failed to close '{path}': {reason}")]
    CloseFailure {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A background decompression thread could not be started
    #[error("Failed to start background reader for '{path}': {reason}")]
    ThreadCreateFailure {
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Invalid option value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A line was requested from a reader that has no open file
    #[error("No file is open")]
    NotOpen,
}

impl TextError {
    /// The failure class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::OpenFailure { .. } => ErrorKind::OpenFailure,
            Self::ReadFailure { .. } => ErrorKind::ReadFailure,
            Self::DecompressFailure { .. } => ErrorKind::DecompressFailure,
            Self::LongLine { .. } => ErrorKind::LongLine,
            Self::CloseFailure { .. } => ErrorKind::CloseFailure,
            Self::ThreadCreateFailure { .. } => ErrorKind::ThreadCreateFailure,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::NotOpen => ErrorKind::NotOpen,
        }
    }

    pub(crate) fn out_of_memory(what: &str, bytes: usize) -> Self {
        Self::OutOfMemory { what: what.to_string(), bytes }
    }

    pub(crate) fn open(path: &Path, source: &std::io::Error) -> Self {
        Self::OpenFailure { path: path.display().to_string(), reason: source.to_string() }
    }

    pub(crate) fn read(path: &Path, source: &std::io::Error) -> Self {
        Self::ReadFailure { path: path.display().to_string(), reason: source.to_string() }
    }

    pub(crate) fn long_line(path: &Path, line_idx: u64, max_line_blen: usize) -> Self {
        Self::LongLine { path: path.display().to_string(), line_idx, max_line_blen }
    }

    /// Wrap a failure to recognise the file's header at open time. A rejected
    /// header means the file cannot be opened as text, so it is an open failure.
    pub(crate) fn from_header(path: &Path, source: CodecError) -> Self {
        match source {
            CodecError::BadHeader { .. } => {
                Self::OpenFailure { path: path.display().to_string(), reason: source.to_string() }
            }
            other => Self::from_codec(path, other),
        }
    }

    /// Wrap a decoder failure, keeping allocation failures distinct.
    pub(crate) fn from_codec(path: &Path, source: CodecError) -> Self {
        match source {
            CodecError::OutOfMemory { what, bytes } => Self::out_of_memory(what, bytes),
            other => Self::DecompressFailure {
                path: path.display().to_string(),
                reason: other.to_string(),
            },
        }
    }
}
