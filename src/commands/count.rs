//! Count the lines of a text file.

use anyhow::Result;
use clap::Parser;
use linestream_lib::LineRead;
use linestream_lib::logging::{OperationTimer, format_count};
use linestream_lib::progress::ProgressTracker;
use log::info;

use crate::commands::command::Command;
use crate::commands::common::{ReadOptions, open_input};

/// Totals gathered by [`count_lines`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineCounts {
    pub lines: u64,
    /// Decoded bytes, newlines included.
    pub bytes: u64,
    /// Longest line without its newline.
    pub longest: u64,
    /// Lines starting with the comment prefix, if one was given.
    pub comments: u64,
}

/// Count lines, decoded bytes and the longest line of a text file.
#[derive(Debug, Parser)]
#[command(
    name = "count",
    about = "\x1b[36mCount lines and decoded bytes\x1b[0m",
    long_about = r#"
Count the lines of a plain, gzip, BGZF or Zstandard text file.

The compression format is detected from the file contents. With --stream,
decompression runs ahead of counting on a background thread; BGZF files are
additionally decoded block-parallel on --threads threads.

Example usage:
  linestream count -i calls.vcf.gz
  linestream count -i calls.vcf.gz --stream --threads 8 --comment-prefix '#'
"#
)]
pub struct Count {
    #[command(flatten)]
    pub read: ReadOptions,

    /// Also count lines starting with this prefix
    #[arg(long = "comment-prefix")]
    pub comment_prefix: Option<String>,

    /// Log progress every N lines
    #[arg(long = "progress-interval", default_value_t = 10_000_000)]
    pub progress_interval: u64,
}

impl Command for Count {
    fn execute(&self) -> Result<()> {
        let timer = OperationTimer::new(&format!("Counting lines in {}", self.read.describe()));
        let mut reader = open_input(&self.read)?;
        let progress = ProgressTracker::new("Counted lines").with_interval(self.progress_interval);

        let prefix = self.comment_prefix.as_deref().map(str::as_bytes);
        let counts = count_lines(reader.as_mut(), prefix, Some(&progress))?;
        progress.log_final();

        if prefix.is_some() {
            info!("Comment lines: {}", format_count(counts.comments));
        }
        info!("Longest line: {} bytes", format_count(counts.longest));
        timer.log_completion(counts.lines, counts.bytes);
        println!("{}", counts.lines);
        Ok(())
    }
}

/// Drain `reader`, tallying lines, bytes and the longest line.
///
/// # Errors
///
/// Returns the reader's failure, if any.
pub fn count_lines(
    reader: &mut dyn LineRead,
    comment_prefix: Option<&[u8]>,
    progress: Option<&ProgressTracker>,
) -> Result<LineCounts> {
    let mut counts = LineCounts::default();
    while let Some(line) = reader.next_line()? {
        counts.lines += 1;
        counts.bytes += line.len() as u64;
        counts.longest = counts.longest.max(line.len() as u64 - 1);
        if comment_prefix.is_some_and(|p| line.starts_with(p)) {
            counts.comments += 1;
        }
        if let Some(progress) = progress {
            progress.log_if_needed(1);
        }
    }
    Ok(counts)
}
