//! CLI command implementations for linestream.
//!
//! - [`count`] - Count lines and decoded bytes
//! - [`cat`] - Write decoded lines to a file or stdout

pub mod cat;
pub mod command;
pub mod common;
pub mod count;
