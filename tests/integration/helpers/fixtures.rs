//! Builders for text fixtures in each supported compression format.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use linestream_codec::BgzfBlockWriter;
use linestream_codec::writer::DEFAULT_BLOCK_SIZE;
use linestream_lib::LineRead;

/// On-disk formats the fixtures can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Plain,
    Gzip,
    Bgzf,
    Zstd,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Plain, Format::Gzip, Format::Bgzf, Format::Zstd];

    fn extension(self) -> &'static str {
        match self {
            Format::Plain => "txt",
            Format::Gzip | Format::Bgzf => "txt.gz",
            Format::Zstd => "txt.zst",
        }
    }
}

/// Writes `content` to `dir/{name}.{ext}` in `format`.
pub fn write_fixture(dir: &Path, name: &str, format: Format, content: &[u8]) -> PathBuf {
    let path = dir.join(format!("{name}.{}", format.extension()));
    match format {
        Format::Plain => std::fs::write(&path, content).unwrap(),
        Format::Gzip => write_gzip(&path, &[content]),
        Format::Bgzf => {
            write_bgzf(&path, content, DEFAULT_BLOCK_SIZE);
        }
        Format::Zstd => write_zstd(&path, &[content]),
    }
    path
}

/// Writes one gzip member per part.
pub fn write_gzip(path: &Path, members: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for member in members {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(member).unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();
    }
}

/// Writes BGZF, cutting a block every `block_size` uncompressed bytes.
///
/// Returns the number of data blocks written.
pub fn write_bgzf(path: &Path, content: &[u8], block_size: usize) -> u64 {
    let mut writer = BgzfBlockWriter::with_block_size(File::create(path).unwrap(), 1, block_size)
        .unwrap();
    writer.write_all(content).unwrap();
    let partial = u64::from(content.len() % block_size.clamp(1, DEFAULT_BLOCK_SIZE) != 0);
    let blocks = writer.block_count() + partial;
    writer.finish().unwrap();
    blocks
}

/// Writes one Zstandard frame per part.
pub fn write_zstd(path: &Path, frames: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for frame in frames {
        file.write_all(&zstd::encode_all(*frame, 3).unwrap()).unwrap();
    }
}

/// `count` newline-terminated lines of varying length (0 to ~200 bytes).
pub fn numbered_lines(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        out.extend_from_slice(format!("line{i}\t").as_bytes());
        out.extend(std::iter::repeat_n(b'a' + (i % 26) as u8, (i * 37) % 191));
        out.push(b'\n');
    }
    out
}

/// Splits `content` into lines the way the readers should return them.
pub fn expected_lines(content: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> =
        content.split_inclusive(|&b| b == b'\n').map(<[u8]>::to_vec).collect();
    if let Some(last) = lines.last_mut() {
        if last.last() != Some(&b'\n') {
            last.push(b'\n');
        }
    }
    lines
}

/// Drains a reader into owned lines.
pub fn read_all<R: LineRead + ?Sized>(reader: &mut R) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(line) = reader.next_line().unwrap() {
        lines.push(line.to_vec());
    }
    lines
}
