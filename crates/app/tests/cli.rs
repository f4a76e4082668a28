//! Integration tests for the framepool CLI.
//!
//! Raw BGR24 files stand in for video so no ffmpeg install is needed.

use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const WIDTH: usize = 8;
const HEIGHT: usize = 4;
const FRAME_BYTES: usize = WIDTH * HEIGHT * 3;

/// Get a command for the framepool binary, quiet unless something warns.
fn framepool() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("framepool").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Writes `count` uniform frames, frame `n` filled with `n * 10`.
fn write_frames(path: &Path, count: usize) {
    let bytes: Vec<u8> = (0..count)
        .flat_map(|n| std::iter::repeat(n as u8 * 10).take(FRAME_BYTES))
        .collect();
    fs::write(path, bytes).unwrap();
}

#[test]
fn inverts_raw_frames_in_order() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bgr");
    let output = dir.path().join("out.bgr");
    write_frames(&input, 12);

    framepool()
        .args(["--raw", "8x4", "--transform", "invert", "--workers", "3"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Thread count: 3"))
        .stdout(predicate::str::contains("Finished processing at"));

    let written = fs::read(&output).unwrap();
    assert_eq!(written.len(), 12 * FRAME_BYTES);
    for (n, frame) in written.chunks(FRAME_BYTES).enumerate() {
        assert!(frame.iter().all(|&b| b == 255 - n as u8 * 10), "frame {n}");
    }
}

#[test]
fn single_worker_mode_matches_pool() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bgr");
    write_frames(&input, 9);

    let run = |extra: &[&str], out: &Path| {
        framepool()
            .args(["--raw", "8x4", "--transform", "grayscale"])
            .args(extra)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(out)
            .assert()
            .success();
        fs::read(out).unwrap()
    };
    let sequential = run(&["--use_mt", "0"], &dir.path().join("seq.bgr"));
    let parallel = run(&["--use-mt", "1", "--drain", "deferred"], &dir.path().join("par.bgr"));
    assert_eq!(sequential, parallel);
}

#[test]
fn strict_input_rejects_partial_frame() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cut.bgr");
    write_frames(&input, 3);
    let mut bytes = fs::read(&input).unwrap();
    bytes.truncate(2 * FRAME_BYTES + 7);
    fs::write(&input, bytes).unwrap();

    let lenient = dir.path().join("lenient.bgr");
    framepool()
        .args(["--raw", "8x4", "--transform", "passthrough"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&lenient)
        .assert()
        .success();
    assert_eq!(fs::read(&lenient).unwrap().len(), 2 * FRAME_BYTES);

    framepool()
        .args(["--raw", "8x4", "--strict-input"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("strict.bgr"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("input ended early"));
}

#[test]
fn missing_input_fails_cleanly() {
    let dir = tempdir().unwrap();
    framepool()
        .args(["--raw", "8x4"])
        .arg("--input")
        .arg(dir.path().join("absent.bgr"))
        .arg("--output")
        .arg(dir.path().join("out.bgr"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to open raw input"));
}

#[test]
fn metrics_are_written_on_request() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bgr");
    let metrics = dir.path().join("metrics.prom");
    write_frames(&input, 5);

    framepool()
        .args(["--raw", "8x4", "--workers", "2"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out.bgr"))
        .arg("--metrics-out")
        .arg(&metrics)
        .assert()
        .success();
    let text = fs::read_to_string(&metrics).unwrap();
    assert!(text.contains("framepool_frames_emitted_total 5"));
}
