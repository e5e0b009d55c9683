//! Rotation scheduler
//!
//! While enabled, records in fixed-length segments: every interval the
//! current session is stopped and a fresh one is started against the same
//! capture target. Finalizing segment N overlaps with starting segment N+1,
//! so no capture time is spent waiting for the recorder's final payload.

use super::coordinator::RecorderEvent;
use super::pipeline::CapturePipeline;
use super::session::RecordingSession;
use crate::capture::acquirer::CaptureMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct Rotation {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RotationScheduler {
    pipeline: Arc<CapturePipeline>,
    interval: Duration,
    rotation: Mutex<Option<Rotation>>,
    enabled: AtomicBool,
}

impl RotationScheduler {
    pub fn new(pipeline: Arc<CapturePipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            rotation: Mutex::new(None),
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start rotating. Returns `false` if rotation was already enabled.
    pub async fn enable(&self) -> bool {
        let mut rotation = self.rotation.lock().await;
        if rotation.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_rotation(
            Arc::clone(&self.pipeline),
            self.interval,
            cancel.clone(),
        ));
        *rotation = Some(Rotation { cancel, task });
        self.enabled.store(true, Ordering::SeqCst);

        tracing::info!("Auto-rotation enabled ({}ms segments)", self.interval.as_millis());
        self.pipeline.emit(RecorderEvent::RotationEnabled);
        true
    }

    /// Stop rotating. Returns `false` if rotation was already disabled.
    ///
    /// The timer is cancelled first, then the active segment is finalized.
    /// Returns only after every in-flight finalize has committed, so no
    /// artifact is appended once this completes.
    ///
    /// An acquisition already under way is allowed to finish before its
    /// segment is discarded. When the platform is showing a share prompt,
    /// this waits for the user to answer it.
    pub async fn disable(&self) -> bool {
        let mut rotation = self.rotation.lock().await;
        let Some(Rotation { cancel, task }) = rotation.take() else {
            return false;
        };

        self.enabled.store(false, Ordering::SeqCst);
        cancel.cancel();
        if let Err(e) = task.await {
            tracing::error!("Rotation task failed: {}", e);
        }

        tracing::info!("Auto-rotation disabled");
        self.pipeline.emit(RecorderEvent::RotationDisabled);
        true
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        if let Some(rotation) = self.rotation.get_mut().as_ref() {
            rotation.cancel.cancel();
        }
    }
}

async fn run_rotation(pipeline: Arc<CapturePipeline>, period: Duration, cancel: CancellationToken) {
    let mut finalizers = JoinSet::new();
    let mut active = open_next(&pipeline, &cancel).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(mut session) = active.take() {
                    let pipeline = Arc::clone(&pipeline);
                    finalizers.spawn(async move {
                        // Failures are reported by finalize itself
                        let _ = pipeline.finalize(&mut session).await;
                    });
                }
                active = open_next(&pipeline, &cancel).await;
            }
            Some(joined) = finalizers.join_next(), if !finalizers.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Segment finalize task failed: {}", e);
                }
            }
        }
    }

    if let Some(mut session) = active.take() {
        let _ = pipeline.finalize(&mut session).await;
    }
    while let Some(joined) = finalizers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Segment finalize task failed: {}", e);
        }
    }
    tracing::debug!("Rotation loop exited");
}

/// Start the next segment, discarding it if rotation was disabled meanwhile
async fn open_next(pipeline: &Arc<CapturePipeline>, cancel: &CancellationToken) -> Option<RecordingSession> {
    match pipeline.open_segment(CaptureMode::Automatic).await {
        Ok(mut session) => {
            if cancel.is_cancelled() {
                tracing::debug!("Rotation disabled while segment {} was starting; discarding it", session.id());
                pipeline.discard(&mut session).await;
                return None;
            }
            tracing::debug!("Rotated into segment {}", session.id());
            Some(session)
        }
        Err(e) => {
            tracing::warn!("Rotation segment failed to start, retrying next interval: {}", e);
            None
        }
    }
}
