//! End-to-end tests for the single-threaded `TextReader`.

use linestream_lib::options::{MIN_CHUNK_SIZE, MIN_MAX_LINE_BLEN};
use linestream_lib::{
    BufferSource, ErrorKind, FileCompression, ReaderOptions, ReaderState, TextError, TextReader,
};
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    Format, expected_lines, numbered_lines, read_all, write_bgzf, write_fixture, write_gzip,
    write_zstd,
};

fn small_chunks() -> ReaderOptions {
    ReaderOptions::new().with_chunk_size(MIN_CHUNK_SIZE)
}

#[rstest]
#[case::plain(Format::Plain, FileCompression::Plain)]
#[case::gzip(Format::Gzip, FileCompression::Gzip)]
#[case::bgzf(Format::Bgzf, FileCompression::Bgzf)]
#[case::zstd(Format::Zstd, FileCompression::Zstd)]
fn test_round_trip_each_format(#[case] format: Format, #[case] compression: FileCompression) {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(20_000);
    let path = write_fixture(dir.path(), "lines", format, &content);

    let mut reader = TextReader::with_options(&path, small_chunks()).unwrap();
    assert_eq!(reader.compression(), Some(compression));
    let lines = read_all(&mut reader);
    assert_eq!(lines, expected_lines(&content));
    assert_eq!(reader.line_idx(), 20_000);
    assert!(reader.is_eof());
}

#[rstest]
#[case::plain(Format::Plain)]
#[case::gzip(Format::Gzip)]
#[case::bgzf(Format::Bgzf)]
#[case::zstd(Format::Zstd)]
fn test_missing_final_newline_is_synthesized(#[case] format: Format) {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "abc", format, b"a\nb\nc");

    let mut reader = TextReader::from_path(&path).unwrap();
    assert_eq!(reader.next_line().unwrap(), Some(&b"a\n"[..]));
    assert_eq!(reader.next_line().unwrap(), Some(&b"b\n"[..]));
    assert_eq!(reader.next_line().unwrap(), Some(&b"c\n"[..]));
    assert_eq!(reader.next_line().unwrap(), None);
    assert_eq!(reader.next_line().unwrap(), None);
    assert_eq!(reader.errcode(), None);
}

#[test]
fn test_empty_files() {
    let dir = TempDir::new().unwrap();
    for format in Format::ALL {
        let path = write_fixture(dir.path(), "empty", format, b"");
        let mut reader = TextReader::from_path(&path).unwrap();
        assert_eq!(reader.next_line().unwrap(), None, "{format:?}");
        assert!(reader.is_eof());
    }
}

#[test]
fn test_multi_member_gzip_and_multi_frame_zstd() {
    let dir = TempDir::new().unwrap();
    let gz = dir.path().join("members.gz");
    write_gzip(&gz, &[b"one\ntw", b"o\nthree\n", b"", b"four"]);
    let zst = dir.path().join("frames.zst");
    write_zstd(&zst, &[b"one\ntw", b"o\nthree\n", b"four"]);

    let expected = expected_lines(b"one\ntwo\nthree\nfour");
    for path in [gz, zst] {
        let mut reader = TextReader::from_path(&path).unwrap();
        assert_eq!(read_all(&mut reader), expected, "{}", path.display());
    }
}

#[test]
fn test_many_small_bgzf_blocks() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(5_000);
    let path = dir.path().join("small_blocks.txt.gz");
    let blocks = write_bgzf(&path, &content, 1000);
    assert!(blocks > 50);

    let mut reader = TextReader::with_options(&path, small_chunks()).unwrap();
    assert_eq!(read_all(&mut reader), expected_lines(&content));
}

#[test]
fn test_long_line_boundary() {
    let dir = TempDir::new().unwrap();
    let max = MIN_MAX_LINE_BLEN;
    let mut content = b"short\n".to_vec();
    content.extend(std::iter::repeat_n(b'x', max));
    content.extend_from_slice(b"\nshort\n");
    content.extend(std::iter::repeat_n(b'y', max + 1));
    content.extend_from_slice(b"\nnever\n");

    for format in Format::ALL {
        let path = write_fixture(dir.path(), "long", format, &content);
        let options = small_chunks().with_max_line_blen(max);
        let mut reader = TextReader::with_options(&path, options).unwrap();

        assert_eq!(reader.next_line().unwrap(), Some(&b"short\n"[..]));
        assert_eq!(reader.next_line().unwrap().map(<[u8]>::len), Some(max + 1));
        assert_eq!(reader.next_line().unwrap(), Some(&b"short\n"[..]));
        let err = reader.next_line().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LongLine, "{format:?}");
        assert!(matches!(err, TextError::LongLine { line_idx: 4, .. }), "{err:?}");
        assert!(reader.buffer_capacity() <= max + MIN_CHUNK_SIZE);

        // Sticky: the same failure without further reading.
        assert_eq!(reader.next_line().unwrap_err(), err);
        assert_eq!(reader.errcode(), Some(ErrorKind::LongLine));
        assert!(matches!(reader.state(), ReaderState::Failed(_)));
    }
}

#[test]
fn test_first_line_too_long_reports_long_line_not_oom() {
    let dir = TempDir::new().unwrap();
    let mut content = vec![b'z'; 2 * MIN_MAX_LINE_BLEN];
    content.push(b'\n');
    let path = write_fixture(dir.path(), "huge", Format::Gzip, &content);

    let options = ReaderOptions::new().with_max_line_blen(MIN_MAX_LINE_BLEN + 16);
    let mut reader = TextReader::with_options(&path, options).unwrap();
    assert_eq!(reader.next_line().unwrap_err().kind(), ErrorKind::LongLine);
}

#[test]
fn test_provided_buffer_is_never_reallocated() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(30_000);
    let path = write_fixture(dir.path(), "provided", Format::Zstd, &content);

    let capacity = MIN_MAX_LINE_BLEN + MIN_CHUNK_SIZE;
    let buffer = Vec::with_capacity(capacity);
    let ptr = buffer.as_ptr();
    let options = small_chunks()
        .with_max_line_blen(MIN_MAX_LINE_BLEN)
        .with_buffer(BufferSource::Provided(buffer));

    let mut reader = TextReader::with_options(&path, options).unwrap();
    assert_eq!(read_all(&mut reader), expected_lines(&content));
    assert_eq!(reader.buffer_capacity(), capacity);
    reader.cleanup().unwrap();

    let returned = reader.take_buffer().unwrap();
    assert_eq!(returned.as_ptr(), ptr);
    assert!(reader.take_buffer().is_none());
}

#[test]
fn test_rewind_rereads_from_start() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(3_000);
    let path = write_fixture(dir.path(), "rewind", Format::Bgzf, &content);

    let mut reader = TextReader::with_options(&path, small_chunks()).unwrap();
    for _ in 0..1_234 {
        reader.next_line().unwrap();
    }
    reader.rewind().unwrap();
    assert_eq!(reader.line_idx(), 0);
    assert_eq!(read_all(&mut reader), expected_lines(&content));

    reader.rewind().unwrap();
    assert!(!reader.is_eof());
    assert_eq!(read_all(&mut reader).len(), 3_000);
}

#[test]
fn test_corrupt_gzip_is_sticky_decompress_failure() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(10_000);
    let path = write_fixture(dir.path(), "corrupt", Format::Gzip, &content);
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    for b in &mut bytes[mid..mid + 64] {
        *b ^= 0x5a;
    }
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = TextReader::with_options(&path, small_chunks()).unwrap();
    let err = loop {
        match reader.next_line() {
            Ok(Some(_)) => {}
            Ok(None) => panic!("corruption was not detected"),
            Err(e) => break e,
        }
    };
    assert_eq!(err.kind(), ErrorKind::DecompressFailure);
    assert_eq!(reader.next_line().unwrap_err(), err);
    reader.cleanup().unwrap();
    assert_eq!(reader.error(), Some(&err));
}

#[test]
fn test_truncated_zstd_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "truncated", Format::Zstd, &numbered_lines(5_000));
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let mut reader = TextReader::from_path(&path).unwrap();
    let err = loop {
        match reader.next_line() {
            Ok(Some(_)) => {}
            Ok(None) => panic!("truncation was not detected"),
            Err(e) => break e,
        }
    };
    assert_eq!(err.kind(), ErrorKind::DecompressFailure);
}

#[test]
fn test_open_failure_leaves_reader_unopened() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.txt");

    let mut reader = TextReader::new();
    let err = reader.open(&missing, ReaderOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailure);
    assert!(!reader.is_open());
    assert_eq!(reader.errcode(), Some(ErrorKind::OpenFailure));

    // The same value can be reopened on a good file.
    let good = write_fixture(dir.path(), "good", Format::Plain, b"ok\n");
    reader.open(&good, ReaderOptions::new()).unwrap();
    assert_eq!(read_all(&mut reader), vec![b"ok\n".to_vec()]);
}

#[test]
fn test_rejected_gzip_header_is_open_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reserved_flags.gz");
    // gzip magic, deflate, reserved FLG bits set
    std::fs::write(&path, [0x1f, 0x8b, 0x08, 0xe0, 0, 0, 0, 0, 0, 0xff, 1, 2, 3, 4, 5, 6]).unwrap();

    let mut reader = TextReader::new();
    let err = reader.open(&path, ReaderOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailure);
    assert!(err.to_string().contains("reserved flags"), "{err}");
    assert!(!reader.is_open());

    let mut stream = linestream_lib::TextStream::new();
    let err = stream.open(&path, linestream_lib::StreamOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailure);
    assert!(!stream.is_open());
}

#[test]
fn test_cleanup_is_idempotent() {
    let mut unopened = TextReader::new();
    unopened.cleanup().unwrap();
    unopened.cleanup().unwrap();

    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "c", Format::Gzip, b"x\n");
    let mut reader = TextReader::from_path(&path).unwrap();
    reader.cleanup().unwrap();
    reader.cleanup().unwrap();
    assert!(!reader.is_open());
    assert_eq!(reader.next_line().unwrap_err().kind(), ErrorKind::NotOpen);
}
