//! Runs the `linestream` binary against fixture files.

use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{Format, numbered_lines, write_fixture};

fn linestream(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_linestream"))
        .args(args)
        .output()
        .expect("Failed to run linestream")
}

#[test]
fn test_count_command_all_modes() {
    let dir = TempDir::new().unwrap();
    let content = numbered_lines(12_345);
    let path = write_fixture(dir.path(), "count", Format::Bgzf, &content);
    let input = path.to_str().unwrap();

    for extra in [&[][..], &["--stream", "--threads", "1"][..], &["--stream", "--threads", "4"][..]] {
        let mut args = vec!["count", "--input", input];
        args.extend_from_slice(extra);
        let output = linestream(&args);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "12345");
    }
}

#[test]
fn test_cat_command_writes_decoded_text() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "cat", Format::Zstd, b"first\nsecond\nthird");
    let out = dir.path().join("out.txt");

    let output = linestream(&[
        "cat",
        "-i",
        path.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--stream",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(std::fs::read(&out).unwrap(), b"first\nsecond\nthird\n");

    let output = linestream(&["cat", "-i", path.to_str().unwrap(), "--head", "2"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"first\nsecond\n");
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.txt");
    let output = linestream(&["count", "-i", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}
