//! Screen Rotator demo
//!
//! Runs auto-rotation against the simulated platform for a while and writes
//! the finished segments to disk.
//!
//! Environment:
//! - `SCREEN_ROTATOR_CONFIG`: path to a JSON `RecorderConfig`
//! - `SCREEN_ROTATOR_RUN_MS`: how long to record (default 3500)
//! - `SCREEN_ROTATOR_OUT`: output directory (default `recordings`)

use anyhow::Context;
use screen_rotator::capture::simulated::{SimulatedDisplay, SimulatedMicrophone, SimulatedPeerConnection};
use screen_rotator::recorder::simulated::SimulatedRecorderProvider;
use screen_rotator::{RecorderConfig, RecorderEvent, ScreenRecorder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_RUN_MS: u64 = 3500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_rotator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Screen Rotator v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::var("SCREEN_ROTATOR_CONFIG") {
        Ok(path) => RecorderConfig::from_file(Path::new(&path))
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => RecorderConfig {
            rotation_interval_ms: 1000,
            chunk_interval_ms: 250,
            ..RecorderConfig::default()
        },
    };
    let run_for = match std::env::var("SCREEN_ROTATOR_RUN_MS") {
        Ok(value) => value.parse::<u64>().context("SCREEN_ROTATOR_RUN_MS must be a number")?,
        Err(_) => DEFAULT_RUN_MS,
    };
    let out_dir = std::env::var("SCREEN_ROTATOR_OUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("recordings"));

    let recorder = ScreenRecorder::new(
        config,
        Arc::new(SimulatedDisplay::new().with_silent_reacquire(true)),
        Arc::new(SimulatedMicrophone::new()),
        Arc::new(SimulatedRecorderProvider::new()),
    )?;

    let peer = Arc::new(SimulatedPeerConnection::new());
    recorder.attach_peer(peer.clone());

    let mut events = recorder.subscribe();
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecorderEvent::ArtifactCommitted(summary) => {
                    tracing::info!("Segment #{} ready ({} bytes)", summary.index, summary.size_bytes);
                }
                RecorderEvent::Notice(notice) => {
                    tracing::warn!("[{}] {}", notice.code, notice.message);
                }
                other => tracing::debug!("{:?}", other),
            }
        }
    });

    recorder.toggle_auto_rotation().await?;

    // The peer joins a little after the first segment starts
    tokio::time::sleep(Duration::from_millis(300)).await;
    peer.deliver_audio("Remote Participant");

    tokio::time::sleep(Duration::from_millis(run_for.saturating_sub(300))).await;
    recorder.shutdown().await;

    let paths = recorder.store().export_all(&out_dir)?;
    for path in &paths {
        tracing::info!("Wrote {}", path.display());
    }
    tracing::info!("{} segments written to {}", paths.len(), out_dir.display());

    drop(recorder);
    logger.abort();
    Ok(())
}
