//! ABOUTME: Encoder child lifecycle against shell stand-ins for ffmpeg
//! ABOUTME: Covers clean finalization on stdin EOF and chatty encoders that fail
#![cfg(unix)]

use mc_capture::FfmpegSegmentSink;
use mc_core::Error;
use mc_record::{SegmentRequest, SegmentSink};
use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::Duration,
};
use test_support::{quiet_frame, TEST_HEIGHT, TEST_WIDTH};

// Copies stdin to the last argument, like an encoder writing its output path
const COPYING_ENCODER: &str = r#"#!/bin/sh
for last; do :; done
cat > "$last"
"#;

// Floods stderr well past a pipe buffer before reading any input, then fails
const CHATTY_FAILING_ENCODER: &str = r#"#!/bin/sh
head -c 262144 /dev/zero | tr '\0' 'e' >&2
echo "encoder gave up" >&2
cat > /dev/null
exit 3
"#;

fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn request(path: PathBuf) -> SegmentRequest {
    SegmentRequest {
        path,
        fourcc: "mp4v".to_string(),
        fps: 15.0,
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
    }
}

/// Open, write `frames` frames, and close on a worker so a stuck child fails the test
fn encode(program: PathBuf, output: PathBuf, frames: usize) -> mc_core::Result<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut sink = FfmpegSegmentSink::new(program);
        let result = sink.open(&request(output)).and_then(|mut handle| {
            let frame = quiet_frame();
            for _ in 0..frames {
                handle.write(&frame)?;
            }
            handle.close()
        });
        let _ = tx.send(result);
    });
    rx.recv_timeout(Duration::from_secs(20))
        .expect("encoder close should not hang")
}

// Both cases live in one test: writing and then executing scripts from
// parallel test threads can race into ETXTBSY.
#[test]
fn test_encoder_child_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let copying = install(dir.path(), "copying-encoder", COPYING_ENCODER);
    let chatty = install(dir.path(), "chatty-encoder", CHATTY_FAILING_ENCODER);

    let output = dir.path().join("2024-01-02_03_04_05.mp4");
    encode(copying, output.clone(), 3).unwrap();
    let frame_len = quiet_frame().as_raw().len() as u64;
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 3 * frame_len);

    let err = encode(chatty, dir.path().join("2024-01-02_03_04_06.mp4"), 3).unwrap_err();
    assert!(matches!(err, Error::Encode(_)));
    let message = err.to_string();
    assert!(message.contains("encoder gave up"));
    assert!(message.len() < 16 * 1024);
}
