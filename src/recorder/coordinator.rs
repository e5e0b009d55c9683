//! Recording coordinator
//!
//! The surface the UI layer talks to: manual start/stop, the auto-rotation
//! toggle, the recording flags and the list of finished artifacts.

use super::backend::RecorderProvider;
use super::pipeline::CapturePipeline;
use super::scheduler::RotationScheduler;
use super::session::RecordingSession;
use super::state::{Artifact, ArtifactSummary};
use super::store::ArtifactStore;
use crate::capture::acquirer::CaptureMode;
use crate::capture::source::{SourceKind, SourceStatus};
use crate::capture::traits::{DisplayCapture, MicrophoneCapture, PeerConnection};
use crate::config::RecorderConfig;
use crate::utils::error::{CaptureError, CaptureResult, ErrorResponse};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Events emitted while recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecorderEvent {
    /// A session started recording
    SessionStarted { session_id: Uuid, mode: CaptureMode },
    /// A session stopped, with or without an artifact
    SessionStopped { session_id: Uuid },
    /// An artifact was appended to the store
    ArtifactCommitted(ArtifactSummary),
    RotationEnabled,
    RotationDisabled,
    /// Non-fatal failure the user should see
    Notice(ErrorResponse),
}

/// Screen recorder with manual and auto-rotating modes
pub struct ScreenRecorder {
    pipeline: Arc<CapturePipeline>,
    scheduler: RotationScheduler,
    /// Manual session; the lock also serializes mode changes
    manual: Mutex<Option<RecordingSession>>,
}

impl ScreenRecorder {
    pub fn new(
        config: RecorderConfig,
        display: Arc<dyn DisplayCapture>,
        microphone: Arc<dyn MicrophoneCapture>,
        recorders: Arc<dyn RecorderProvider>,
    ) -> CaptureResult<Self> {
        config.validate()?;
        let interval = config.rotation_interval();
        let pipeline = Arc::new(CapturePipeline::new(config, display, microphone, recorders));

        Ok(Self {
            scheduler: RotationScheduler::new(Arc::clone(&pipeline), interval),
            pipeline,
            manual: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        self.pipeline.config()
    }

    /// Subscribe to recorder events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.pipeline.subscribe()
    }

    /// Record remote audio from `peer` in every session from now on
    pub fn attach_peer(&self, peer: Arc<dyn PeerConnection>) {
        self.pipeline.attach_peer(peer);
    }

    pub fn detach_peer(&self) {
        self.pipeline.detach_peer();
    }

    /// Whether any session is currently recording
    pub fn is_recording(&self) -> bool {
        self.pipeline.activity().is_active()
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.scheduler.is_enabled()
    }

    pub fn source_status(&self, kind: SourceKind) -> SourceStatus {
        self.pipeline.acquirer().status(kind)
    }

    /// Finished artifacts, oldest first
    pub fn artifacts(&self) -> Vec<Arc<Artifact>> {
        self.pipeline.store().list()
    }

    pub fn artifact_summaries(&self) -> Vec<ArtifactSummary> {
        self.pipeline.store().summaries()
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        self.pipeline.store()
    }

    /// Prompt for a display and start recording it
    pub async fn start_manual(&self) -> CaptureResult<()> {
        let mut manual = self.manual.lock().await;
        if self.scheduler.is_enabled() || manual.as_ref().is_some_and(RecordingSession::is_recording) {
            return Err(CaptureError::AlreadyRecording);
        }

        let session = self.pipeline.open_segment(CaptureMode::Manual).await?;
        tracing::info!("Manual recording started (session {})", session.id());
        *manual = Some(session);
        Ok(())
    }

    /// Stop the manual recording and return its artifact
    pub async fn stop_manual(&self) -> CaptureResult<Arc<Artifact>> {
        let mut manual = self.manual.lock().await;
        let Some(mut session) = manual.take() else {
            return Err(CaptureError::NotRecording);
        };
        self.pipeline.finalize(&mut session).await
    }

    /// Flip auto-rotation on or off, returning the new state.
    ///
    /// Turning it off waits until the last segment has been committed. If the
    /// next segment's display is still being acquired, that includes waiting
    /// for the user to answer the share prompt; manual start and stop are
    /// held back until then.
    pub async fn toggle_auto_rotation(&self) -> CaptureResult<bool> {
        let manual = self.manual.lock().await;
        if self.scheduler.is_enabled() {
            self.scheduler.disable().await;
            return Ok(false);
        }
        if manual.as_ref().is_some_and(RecordingSession::is_recording) {
            return Err(CaptureError::AlreadyRecording);
        }

        self.scheduler.enable().await;
        Ok(true)
    }

    /// Stop everything and release every track still held
    pub async fn shutdown(&self) {
        let mut manual = self.manual.lock().await;
        self.scheduler.disable().await;
        self.pipeline.detach_peer();

        if let Some(mut session) = manual.take() {
            if session.is_recording() {
                let _ = self.pipeline.finalize(&mut session).await;
            }
        }
        tracing::info!("Screen recorder shut down with {} artifacts", self.pipeline.store().len());
    }
}

impl Drop for ScreenRecorder {
    fn drop(&mut self) {
        // The peer listener holds the pipeline
        self.pipeline.detach_peer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedDisplay, SimulatedMicrophone, SimulatedPeerConnection};
    use crate::recorder::simulated::SimulatedRecorderProvider;
    use std::time::Duration;

    fn recorder(display: Arc<SimulatedDisplay>) -> ScreenRecorder {
        let config = RecorderConfig {
            rotation_interval_ms: 100,
            chunk_interval_ms: 20,
            ..RecorderConfig::default()
        };
        ScreenRecorder::new(
            config,
            display,
            Arc::new(SimulatedMicrophone::new()),
            Arc::new(SimulatedRecorderProvider::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = RecorderConfig {
            chunk_interval_ms: 0,
            ..RecorderConfig::default()
        };
        let result = ScreenRecorder::new(
            config,
            Arc::new(SimulatedDisplay::new()),
            Arc::new(SimulatedMicrophone::new()),
            Arc::new(SimulatedRecorderProvider::new()),
        );
        assert!(matches!(result, Err(CaptureError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_manual_start_stop() {
        let display = Arc::new(SimulatedDisplay::new());
        let recorder = recorder(display.clone());

        recorder.start_manual().await.unwrap();
        assert!(recorder.is_recording());
        assert!(matches!(recorder.start_manual().await, Err(CaptureError::AlreadyRecording)));
        assert_eq!(display.prompt_count(), 1);

        let artifact = recorder.stop_manual().await.unwrap();
        assert_eq!(artifact.index(), 1);
        assert!(!recorder.is_recording());
        assert_eq!(recorder.artifacts().len(), 1);
        assert!(matches!(recorder.stop_manual().await, Err(CaptureError::NotRecording)));
    }

    #[tokio::test]
    async fn test_manual_denied_leaves_state_untouched() {
        let display = Arc::new(SimulatedDisplay::new());
        display.set_denied(true);
        let recorder = recorder(display.clone());

        let err = recorder.start_manual().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert!(!recorder.is_recording());
        assert_eq!(recorder.source_status(SourceKind::Video), SourceStatus::Denied);
        assert!(matches!(recorder.stop_manual().await, Err(CaptureError::NotRecording)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_modes_are_exclusive() {
        let recorder = recorder(Arc::new(SimulatedDisplay::new()));

        recorder.start_manual().await.unwrap();
        assert!(matches!(recorder.toggle_auto_rotation().await, Err(CaptureError::AlreadyRecording)));
        recorder.stop_manual().await.unwrap();

        assert!(recorder.toggle_auto_rotation().await.unwrap());
        assert!(recorder.is_auto_rotating());
        assert!(matches!(recorder.start_manual().await, Err(CaptureError::AlreadyRecording)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!recorder.toggle_auto_rotation().await.unwrap());
        assert!(!recorder.is_auto_rotating());
        assert_eq!(recorder.artifacts().len(), 2);
    }

    #[tokio::test]
    async fn test_events_report_rotation_toggle() {
        let recorder = recorder(Arc::new(SimulatedDisplay::new()));
        let mut events = recorder.subscribe();

        recorder.toggle_auto_rotation().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), RecorderEvent::RotationEnabled);
        recorder.toggle_auto_rotation().await.unwrap();

        let mut saw_disabled = false;
        while let Ok(event) = events.try_recv() {
            saw_disabled |= event == RecorderEvent::RotationDisabled;
        }
        assert!(saw_disabled);
    }

    #[tokio::test]
    async fn test_shutdown_releases_manual_tracks() {
        let display = Arc::new(SimulatedDisplay::new());
        let recorder = recorder(display.clone());
        recorder.start_manual().await.unwrap();

        recorder.shutdown().await;
        assert!(!recorder.is_recording());
        assert!(display.granted_tracks().iter().all(|t| !t.is_live()));
        assert_eq!(recorder.artifacts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_peer_stops_remote_audio() {
        let recorder = recorder(Arc::new(SimulatedDisplay::new()));
        let peer = Arc::new(SimulatedPeerConnection::new());
        recorder.attach_peer(peer.clone());
        let remote = peer.deliver_audio("remote");
        tokio::time::sleep(Duration::from_millis(10)).await;

        recorder.start_manual().await.unwrap();
        recorder.detach_peer();
        let artifact = recorder.stop_manual().await.unwrap();
        let text = String::from_utf8(artifact.payload().to_vec()).unwrap();
        assert!(text.contains(&remote.id().to_string()));

        recorder.start_manual().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let artifact = recorder.stop_manual().await.unwrap();
        let text = String::from_utf8(artifact.payload().to_vec()).unwrap();
        assert!(!text.contains(&remote.id().to_string()));
        assert!(remote.is_live());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(RecorderEvent::SessionStopped {
            session_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(json["type"], "sessionStopped");
        assert_eq!(json["sessionId"], Uuid::nil().to_string());
    }
}
