//! ABOUTME: Startup checks for the capture backends
//! ABOUTME: Bad output settings must fail before any device is opened

use mc_capture::{open_backends, FfmpegSegmentSink};
use mc_config::Config;
use mc_core::Error;
use mc_record::{SegmentRequest, SegmentWriter};
use std::path::PathBuf;
use test_support::{temp_dir_path, TEST_HEIGHT, TEST_WIDTH};

#[test]
fn test_missing_output_dir_fails_startup() {
    let mut config = Config::default();
    config.recording.output_dir = temp_dir_path().join("does").join("not").join("exist");

    let result = open_backends(&config);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_segment_writer_surfaces_sink_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = FfmpegSegmentSink::new(PathBuf::from("motioncam-no-such-ffmpeg"));

    let request = SegmentRequest {
        path: dir.path().join("2024-01-02_03_04_05.mp4"),
        fourcc: "mp4v".to_string(),
        fps: 15.0,
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
    };

    assert!(SegmentWriter::open(&mut sink, request).is_err());
}
