//! End-to-end tests for the decompress-ahead `TextStream`.

use std::thread;
use std::time::{Duration, Instant};

use linestream_lib::options::{MIN_CHUNK_SIZE, MIN_MAX_LINE_BLEN};
use linestream_lib::{
    BufferSource, ErrorKind, FileCompression, LineRead, ReaderOptions, StreamOptions, TextError,
    TextReader, TextStream,
};
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{Format, expected_lines, numbered_lines, read_all, write_bgzf, write_fixture};

fn stream_options(threads: usize) -> StreamOptions {
    StreamOptions::new()
        .with_reader_options(
            ReaderOptions::new().with_chunk_size(MIN_CHUNK_SIZE).with_max_line_blen(MIN_MAX_LINE_BLEN),
        )
        .with_decompress_threads(threads)
}

#[rstest]
fn test_matches_single_threaded_reader(
    #[values(Format::Plain, Format::Gzip, Format::Bgzf, Format::Zstd)] format: Format,
    #[values(1, 4)] threads: usize,
) {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(40_000);
    let path = write_fixture(dir.path(), "equiv", format, &content);

    let mut reader = TextReader::from_path(&path).unwrap();
    let expected = read_all(&mut reader);

    let mut stream = TextStream::with_options(&path, stream_options(threads)).unwrap();
    let lines = read_all(&mut stream);
    assert_eq!(lines.len(), expected.len());
    assert_eq!(lines, expected);
    assert!(stream.is_eof());
    assert_eq!(stream.next_line().unwrap(), None);
}

#[test]
fn test_bgzf_many_blocks_four_workers() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(8_000);
    let path = dir.path().join("blocks.txt.gz");
    let blocks = write_bgzf(&path, &content, 16 * 1024);
    assert!(blocks >= 50, "only {blocks} blocks");

    let mut stream = TextStream::with_options(&path, stream_options(4)).unwrap();
    assert_eq!(stream.compression(), Some(FileCompression::Bgzf));
    assert_eq!(read_all(&mut stream), expected_lines(&content));
}

#[rstest]
#[case::gzip(Format::Gzip, 1)]
#[case::bgzf_parallel(Format::Bgzf, 3)]
#[case::zstd(Format::Zstd, 1)]
fn test_uneven_consumer_pacing(#[case] format: Format, #[case] threads: usize) {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(30_000);
    let path = write_fixture(dir.path(), "paced", format, &content);

    let mut stream = TextStream::with_options(&path, stream_options(threads)).unwrap();
    let mut lines = Vec::new();
    while let Some(line) = stream.next_line().unwrap() {
        lines.push(line.to_vec());
        // Stall now and then so the producer fills the ring and has to wait.
        if lines.len() % 7_919 == 0 {
            thread::sleep(Duration::from_millis(20));
        }
    }
    assert_eq!(lines, expected_lines(&content));
}

#[test]
fn test_current_line_matches_returned_line() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "current", Format::Zstd, b"alpha\nbeta\n");
    let mut stream = TextStream::from_path(&path).unwrap();
    assert_eq!(stream.next_line().unwrap(), Some(&b"alpha\n"[..]));
    assert_eq!(stream.current_line(), b"alpha\n");
    assert_eq!(stream.next_line().unwrap(), Some(&b"beta\n"[..]));
    assert_eq!(stream.current_line(), b"beta\n");
}

#[test]
fn test_retarget_switches_files_and_formats() {
    let dir = TempDir::new().unwrap();
    let first = numbered_lines(20_000);
    let second = b"x\ny\nz".to_vec();
    let first_path = write_fixture(dir.path(), "first", Format::Gzip, &first);
    let second_path = write_fixture(dir.path(), "second", Format::Bgzf, &second);

    let mut stream = TextStream::with_options(&first_path, stream_options(2)).unwrap();
    for _ in 0..500 {
        stream.next_line().unwrap();
    }
    stream.retarget(&second_path).unwrap();
    assert_eq!(stream.line_idx(), 0);
    assert_eq!(stream.path(), Some(second_path.as_path()));
    assert_eq!(stream.compression(), Some(FileCompression::Bgzf));
    assert_eq!(read_all(&mut stream), expected_lines(&second));

    // Retargeting after end of file restarts the stream.
    stream.retarget(&first_path).unwrap();
    assert!(!stream.is_eof());
    assert_eq!(read_all(&mut stream), expected_lines(&first));
}

#[test]
fn test_rewind_after_partial_read() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(10_000);
    let path = write_fixture(dir.path(), "rewind", Format::Bgzf, &content);

    let mut stream = TextStream::with_options(&path, stream_options(4)).unwrap();
    for _ in 0..777 {
        stream.next_line().unwrap();
    }
    stream.rewind().unwrap();
    assert_eq!(read_all(&mut stream), expected_lines(&content));
}

#[test]
fn test_long_line_is_sticky_with_line_number() {
    let dir = TempDir::new().unwrap();
    let mut content = b"a\nb\n".to_vec();
    content.extend(std::iter::repeat_n(b'q', MIN_MAX_LINE_BLEN + 1));
    content.extend_from_slice(b"\nafter\n");
    let path = write_fixture(dir.path(), "long", Format::Zstd, &content);

    let mut stream = TextStream::with_options(&path, stream_options(1)).unwrap();
    assert_eq!(stream.next_line().unwrap(), Some(&b"a\n"[..]));
    assert_eq!(stream.next_line().unwrap(), Some(&b"b\n"[..]));
    let err = stream.next_line().unwrap_err();
    assert!(matches!(err, TextError::LongLine { line_idx: 3, .. }), "{err:?}");
    assert_eq!(stream.next_line().unwrap_err(), err);
    assert_eq!(stream.errcode(), Some(ErrorKind::LongLine));

    // Cleanup succeeds and keeps the recorded failure.
    stream.cleanup().unwrap();
    assert_eq!(stream.error(), Some(&err));
}

#[test]
fn test_provided_ring_is_returned() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(25_000);
    let path = write_fixture(dir.path(), "provided", Format::Gzip, &content);

    let buffer = Vec::with_capacity(MIN_MAX_LINE_BLEN + MIN_CHUNK_SIZE);
    let ptr = buffer.as_ptr();
    let options = StreamOptions::new().with_reader_options(
        ReaderOptions::new()
            .with_chunk_size(MIN_CHUNK_SIZE)
            .with_max_line_blen(MIN_MAX_LINE_BLEN)
            .with_buffer(BufferSource::Provided(buffer)),
    );
    let mut stream = TextStream::with_options(&path, options).unwrap();
    assert_eq!(read_all(&mut stream), expected_lines(&content));
    stream.cleanup().unwrap();
    let returned = stream.take_buffer().unwrap();
    assert_eq!(returned.as_ptr(), ptr);
}

#[test]
fn test_shutdown_while_producer_waits_is_prompt() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(200_000);
    let path = write_fixture(dir.path(), "big", Format::Bgzf, &content);

    let mut stream = TextStream::with_options(&path, stream_options(4)).unwrap();
    for _ in 0..10 {
        stream.next_line().unwrap();
    }
    // Give the producer time to fill the ring and block.
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    stream.cleanup().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!stream.is_open());
    stream.cleanup().unwrap();
}

#[test]
fn test_open_failures() {
    let dir = TempDir::new().unwrap();
    let mut stream = TextStream::new();
    assert_eq!(stream.next_line().unwrap_err(), TextError::NotOpen);
    stream.cleanup().unwrap();

    let err = stream.open(dir.path().join("missing.gz"), StreamOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailure);
    assert!(!stream.is_open());

    let path = write_fixture(dir.path(), "ok", Format::Plain, b"1\n");
    let bad = StreamOptions::new()
        .with_reader_options(ReaderOptions::new().with_max_line_blen(MIN_MAX_LINE_BLEN - 1));
    assert_eq!(stream.open(&path, bad).unwrap_err().kind(), ErrorKind::InvalidParameter);

    stream.open(&path, StreamOptions::new()).unwrap();
    assert_eq!(read_all(&mut stream), vec![b"1\n".to_vec()]);
}

#[test]
fn test_line_read_trait_object() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(1_000);
    let path = write_fixture(dir.path(), "dyn", Format::Gzip, &content);

    let mut readers: Vec<Box<dyn LineRead>> = vec![
        Box::new(TextReader::from_path(&path).unwrap()),
        Box::new(TextStream::with_options(&path, stream_options(1)).unwrap()),
    ];
    for reader in &mut readers {
        assert_eq!(read_all(reader.as_mut()), expected_lines(&content));
        assert_eq!(reader.line_idx(), 1_000);
    }
}
