//! Compression format detection from leading file bytes.

use std::fmt;

/// Number of leading bytes [`FileCompression::sniff`] needs to tell every format apart.
pub const SNIFF_LEN: usize = 16;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: u32 = 0xFD2F_B528;
const ZSTD_SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;
const ZSTD_SKIPPABLE_MAGIC: u32 = 0x184D_2A50;

/// Compression applied to a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCompression {
    /// Uncompressed text.
    Plain,
    /// Ordinary gzip (one or more members).
    Gzip,
    /// Blocked gzip: a series of independent gzip members carrying a `BC` extra subfield.
    Bgzf,
    /// Zstandard (one or more frames).
    Zstd,
}

impl FileCompression {
    /// Detect the compression from the first bytes of a file.
    ///
    /// Pass at least [`SNIFF_LEN`] bytes when the file has that many; shorter or
    /// unrecognised input is treated as plain text.
    #[must_use]
    pub fn sniff(header: &[u8]) -> Self {
        if header.len() >= 2 && header[..2] == GZIP_MAGIC {
            if is_bgzf_header(header) {
                return Self::Bgzf;
            }
            return Self::Gzip;
        }
        if header.len() >= 4 {
            let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            if magic == ZSTD_MAGIC || magic & ZSTD_SKIPPABLE_MASK == ZSTD_SKIPPABLE_MAGIC {
                return Self::Zstd;
            }
        }
        Self::Plain
    }

    /// Short lowercase name used in messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Bgzf => "bgzf",
            Self::Zstd => "zstd",
        }
    }

    /// Whether blocks of this format can be decoded independently of each other.
    #[must_use]
    pub fn is_block_parallel(self) -> bool {
        self == Self::Bgzf
    }
}

impl fmt::Display for FileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CM=deflate, FLG=FEXTRA, XLEN=6 and a `BC` subfield of length 2.
fn is_bgzf_header(header: &[u8]) -> bool {
    header.len() >= SNIFF_LEN
        && header[2] == 0x08
        && header[3] == 0x04
        && header[10..16] == [0x06, 0x00, b'B', b'C', 0x02, 0x00]
}
