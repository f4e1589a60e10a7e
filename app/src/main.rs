use app::{cancel_on_ctrl_c, run_recorder, Cli};
use clap::Parser;
use mc_core::{telemetry, SystemClock};
use std::{process, sync::Arc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration - exit with non-zero if invalid
    let config = match cli.load_config() {
        Ok(config) => {
            telemetry::init_tracing(&config.telemetry.environment, "motioncam");
            tracing::debug!(?config, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            telemetry::init_tracing("development", "motioncam");
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(2);
        }
    };

    tracing::info!(
        device = %config.capture.device,
        output_dir = %config.recording.output_dir.display(),
        threshold = config.detection.threshold,
        "motioncam starting"
    );

    let (source, sink) = match mc_capture::open_backends(&config) {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!("Failed to open capture backends: {}", e);
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match run_recorder(&config, source, sink, Arc::new(SystemClock), cancel).await {
        Ok(summary) => {
            tracing::info!(
                frames = summary.frames_processed,
                segments = summary.sessions.len(),
                "motioncam stopped"
            );
        }
        Err(e) => {
            tracing::error!("Recorder failed: {}", e);
            process::exit(1);
        }
    }
}
