//! Write the decoded lines of a text file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use linestream_lib::LineRead;
use linestream_lib::logging::OperationTimer;

use crate::commands::command::Command;
use crate::commands::common::{ReadOptions, open_input};

/// Decompress a text file, writing its lines to a file or stdout.
#[derive(Debug, Parser)]
#[command(
    name = "cat",
    about = "\x1b[36mWrite decoded lines to a file or stdout\x1b[0m",
    long_about = r#"
Decompress a plain, gzip, BGZF or Zstandard text file and write its lines.

Output always ends with a newline: a final line without one gets one appended.

Example usage:
  linestream cat -i reads.tsv.zst -o reads.tsv
  linestream cat -i calls.vcf.gz --stream --head 100
"#
)]
pub struct Cat {
    #[command(flatten)]
    pub read: ReadOptions,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Stop after this many lines
    #[arg(short = 'n', long = "head")]
    pub head: Option<u64>,
}

impl Command for Cat {
    fn execute(&self) -> Result<()> {
        let timer = OperationTimer::new(&format!("Decoding {}", self.read.describe()));
        let mut reader = open_input(&self.read)?;

        let out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            None => Box::new(io::stdout().lock()),
        };
        let mut out = BufWriter::with_capacity(1 << 20, out);

        let (lines, bytes) = copy_lines(reader.as_mut(), &mut out, self.head)?;
        out.flush()?;
        timer.log_completion(lines, bytes);
        Ok(())
    }
}

/// Copy up to `limit` lines from `reader` to `out`, returning lines and bytes written.
///
/// # Errors
///
/// Returns the reader's failure or a write error.
pub fn copy_lines<W: Write>(
    reader: &mut dyn LineRead,
    out: &mut W,
    limit: Option<u64>,
) -> Result<(u64, u64)> {
    let limit = limit.unwrap_or(u64::MAX);
    let (mut lines, mut bytes) = (0u64, 0u64);
    while lines < limit {
        let Some(line) = reader.next_line()? else { break };
        out.write_all(line)?;
        lines += 1;
        bytes += line.len() as u64;
    }
    Ok((lines, bytes))
}
