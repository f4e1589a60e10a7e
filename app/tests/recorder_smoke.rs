//! ABOUTME: Smoke test for the binary's async wiring
//! ABOUTME: Runs the recorder on the blocking pool with scripted frames and cancellation

use app::{run_recorder, Cli};
use clap::Parser;
use mc_config::Config;
use mc_core::ManualClock;
use mc_record::SessionEnd;
use std::{
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};
use test_support::{motion_frame, quiet_frame, scene, MemorySink, ScriptedSource};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn config(dir: &tempfile::TempDir) -> Config {
    let outdir = dir.path().to_string_lossy().to_string();
    let cli = Cli::parse_from([
        "motioncam",
        "--outdir",
        outdir.as_str(),
        "--time",
        "0",
        "--rec",
        "1",
    ]);
    let mut config = Config::default();
    cli.apply(&mut config);
    config
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)))
}

#[tokio::test]
async fn test_scripted_run_records_one_segment() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_frames(scene(60, 5, 80), 2.0).cancel_when_done(cancel.clone());

    let summary = timeout(
        Duration::from_secs(30),
        run_recorder(&config, Box::new(source), Box::new(sink.clone()), clock(), cancel),
    )
    .await
    .expect("recorder should stop when the script ends")
    .unwrap();

    assert_eq!(summary.sessions.len(), 1);
    assert_eq!(summary.sessions[0].reason, SessionEnd::Quiet);
    assert!(summary.sessions[0].path.starts_with(dir.path()));
    assert_eq!(sink.segment_count(), 1);
    assert_eq!(sink.segments()[0].closes, 1);
}

#[tokio::test]
async fn test_external_cancel_stops_recorder() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();

    // After the script the source misses forever; only the token can stop it
    let mut script: Vec<_> = (0..60).map(|_| Some(quiet_frame())).collect();
    script.extend((0..3).map(|_| Some(motion_frame())));
    let source = ScriptedSource::new(script, 2.0);

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        let config = config.clone();
        let sink = sink.clone();
        async move { run_recorder(&config, Box::new(source), Box::new(sink), clock(), cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let summary = timeout(Duration::from_secs(10), handle)
        .await
        .expect("recorder should observe cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(summary.frames_processed, 63);
    assert_eq!(summary.sessions.len(), 1);
    assert_eq!(summary.sessions[0].reason, SessionEnd::Cancelled);
    assert_eq!(sink.segments()[0].closes, 1);
}
