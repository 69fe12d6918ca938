//! Input validation utilities
//!
//! Validation functions for reader options, with consistent error messages.
//! All of them return [`TextError::InvalidParameter`] on failure.

use crate::errors::{Result, TextError};
use crate::options::{MIN_CHUNK_SIZE, MIN_MAX_LINE_BLEN};

fn invalid(parameter: &str, reason: String) -> TextError {
    TextError::InvalidParameter { parameter: parameter.to_string(), reason }
}

/// Validate the maximum line length against its 1 MiB floor
///
/// # Errors
/// Returns an error if `max_line_blen` is below [`MIN_MAX_LINE_BLEN`]
///
/// # Example
/// ```
/// use linestream_lib::validation::validate_max_line_blen;
///
/// assert!(validate_max_line_blen(1 << 20).is_ok());
/// assert!(validate_max_line_blen(4096).is_err());
/// ```
pub fn validate_max_line_blen(max_line_blen: usize) -> Result<()> {
    if max_line_blen < MIN_MAX_LINE_BLEN {
        return Err(invalid(
            "max-line-blen",
            format!("must be >= {MIN_MAX_LINE_BLEN}, got {max_line_blen}"),
        ));
    }
    Ok(())
}

/// Validate the per-refill chunk size
///
/// # Errors
/// Returns an error if `chunk_size` is below [`MIN_CHUNK_SIZE`] or above `max_line_blen`
pub fn validate_chunk_size(chunk_size: usize, max_line_blen: usize) -> Result<()> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(invalid("chunk-size", format!("must be >= {MIN_CHUNK_SIZE}, got {chunk_size}")));
    }
    if chunk_size > max_line_blen {
        return Err(invalid(
            "chunk-size",
            format!("must not exceed max-line-blen ({max_line_blen}), got {chunk_size}"),
        ));
    }
    Ok(())
}

/// Validate a caller-provided buffer
///
/// The buffer must hold at least one chunk, and `max_line_blen` must be at least
/// `capacity - chunk_size` so that a full buffer is always reported as a long line.
///
/// # Errors
/// Returns an error if either condition does not hold
pub fn validate_buffer(capacity: usize, chunk_size: usize, max_line_blen: usize) -> Result<()> {
    if capacity < chunk_size {
        return Err(invalid(
            "buffer",
            format!("provided buffer of {capacity} bytes is smaller than one chunk ({chunk_size})"),
        ));
    }
    if max_line_blen < capacity - chunk_size {
        return Err(invalid(
            "max-line-blen",
            format!(
                "must be >= buffer capacity minus chunk size ({}), got {max_line_blen}",
                capacity - chunk_size
            ),
        ));
    }
    Ok(())
}
