//! Error types for format decoding.

use thiserror::Error;

use crate::format::FileCompression;

/// Error type for decoder operations.
///
/// Every variant carries the format that failed and a human-readable reason,
/// captured once at the point of failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The stream header does not describe data this decoder can handle.
    #[error("Invalid {format} header: {reason}")]
    BadHeader {
        /// Format whose header was rejected
        format: FileCompression,
        /// Description of the problem
        reason: String,
    },

    /// The compressed payload is malformed or fails an integrity check.
    #[error("Corrupt {format} data: {reason}")]
    Corrupt {
        /// Format being decoded
        format: FileCompression,
        /// Description of the problem
        reason: String,
    },

    /// The source ended in the middle of a member, block or frame.
    #[error("Truncated {format} stream: {reason}")]
    Truncated {
        /// Format being decoded
        format: FileCompression,
        /// What was incomplete
        reason: String,
    },

    /// A decoder buffer could not be allocated.
    #[error("Out of memory allocating {bytes} bytes for {what}")]
    OutOfMemory {
        /// What was being allocated
        what: &'static str,
        /// Requested size in bytes
        bytes: usize,
    },
}

impl CodecError {
    pub(crate) fn bad_header(format: FileCompression, reason: impl Into<String>) -> Self {
        Self::BadHeader { format, reason: reason.into() }
    }

    pub(crate) fn corrupt(format: FileCompression, reason: impl Into<String>) -> Self {
        Self::Corrupt { format, reason: reason.into() }
    }

    pub(crate) fn truncated(format: FileCompression, reason: impl Into<String>) -> Self {
        Self::Truncated { format, reason: reason.into() }
    }
}
