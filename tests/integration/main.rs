//! Integration tests for the linestream library.
//!
//! These tests read fixtures written in every supported compression format and
//! check both readers end to end, plus the worker pool used for BGZF.

mod helpers;
mod test_cli;
mod test_pool;
mod test_reader;
mod test_stream;
