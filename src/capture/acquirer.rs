//! Source acquisition
//!
//! Obtains display, microphone and remote-peer audio sources from the
//! platform primitives and validates what comes back. Every acquisition may
//! put a permission prompt in front of the user.

use super::source::{MediaSource, SourceKind, SourceStatus};
use super::track::TrackKind;
use super::traits::{
    DisplayCapture, DisplayConstraints, DisplayGrant, DisplayTarget, MicrophoneCapture,
    PeerConnection, RemoteTrackEvent,
};
use crate::config::RecorderConfig;
use crate::utils::error::{CaptureError, CaptureResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// How a display capture is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// User-initiated; always prompts, any surface
    Manual,
    /// Rotation-driven; reuses the previous target without prompting when possible
    Automatic,
}

/// Obtains and validates individual media sources
pub struct SourceAcquirer {
    display: Arc<dyn DisplayCapture>,
    microphone: Arc<dyn MicrophoneCapture>,
    config: RecorderConfig,
    last_target: Mutex<Option<DisplayTarget>>,
    statuses: Mutex<HashMap<SourceKind, SourceStatus>>,
}

impl SourceAcquirer {
    pub fn new(
        display: Arc<dyn DisplayCapture>,
        microphone: Arc<dyn MicrophoneCapture>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            display,
            microphone,
            config,
            last_target: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Status of the most recent acquisition of `kind`
    pub fn status(&self, kind: SourceKind) -> SourceStatus {
        self.statuses.lock().get(&kind).copied().unwrap_or_default()
    }

    /// Target remembered for automatic re-acquisition, if any
    pub fn automatic_target(&self) -> Option<DisplayTarget> {
        self.last_target.lock().clone()
    }

    /// Acquire the display source.
    ///
    /// Fails with `PermissionDenied` if the user dismisses the prompt and
    /// `NoSourceAvailable` if the platform grants no video track.
    pub async fn acquire_display(&self, mode: CaptureMode) -> CaptureResult<MediaSource> {
        let constraints = self.config.display_constraints(mode);
        self.set_status(SourceKind::Video, SourceStatus::Pending);

        let result = match mode {
            CaptureMode::Manual => self.display.request(&constraints).await,
            CaptureMode::Automatic => self.request_automatic(&constraints).await,
        };
        let grant = self.settle(SourceKind::Video, result)?;

        if !grant.tracks.iter().any(|t| t.kind() == TrackKind::Video && t.is_live()) {
            for track in &grant.tracks {
                track.stop();
            }
            self.set_status(SourceKind::Video, SourceStatus::Ended);
            return Err(CaptureError::NoSourceAvailable(format!(
                "'{}' granted no live video track",
                grant.target.name
            )));
        }

        if mode == CaptureMode::Automatic {
            *self.last_target.lock() = Some(grant.target.clone());
        }

        tracing::info!(
            "Acquired display '{}' ({:?} mode, {} tracks)",
            grant.target.name,
            mode,
            grant.tracks.len()
        );
        Ok(MediaSource::new(SourceKind::Video, grant.tracks))
    }

    async fn request_automatic(&self, constraints: &DisplayConstraints) -> CaptureResult<DisplayGrant> {
        let previous = self.last_target.lock().clone();

        if let Some(target) = previous {
            if self.display.supports_silent_reacquire() {
                match self.display.reacquire(&target, constraints).await {
                    Ok(grant) => {
                        tracing::debug!("Silently re-acquired '{}'", target.name);
                        return Ok(grant);
                    }
                    Err(e) => {
                        tracing::warn!("Re-acquiring '{}' failed, prompting instead: {}", target.name, e);
                    }
                }
            } else {
                tracing::debug!("Platform cannot re-acquire '{}' silently, prompting", target.name);
            }
        }

        self.display.request(constraints).await
    }

    /// Acquire the local microphone
    pub async fn acquire_microphone(&self) -> CaptureResult<MediaSource> {
        self.set_status(SourceKind::LocalAudio, SourceStatus::Pending);

        let result = self.microphone.request(&self.config.microphone).await;
        let tracks = self.settle(SourceKind::LocalAudio, result)?;

        let (audio, other): (Vec<_>, Vec<_>) = tracks
            .into_iter()
            .partition(|t| t.kind() == TrackKind::Audio);
        for track in other {
            track.stop();
        }

        if audio.is_empty() {
            self.set_status(SourceKind::LocalAudio, SourceStatus::Ended);
            return Err(CaptureError::NoSourceAvailable(
                "microphone granted no audio track".to_string(),
            ));
        }

        tracing::info!("Acquired microphone ({} tracks)", audio.len());
        Ok(MediaSource::new(SourceKind::LocalAudio, audio))
    }

    /// Wait for the peer's first audio track.
    ///
    /// Track arrival races `timeout`; whichever comes first wins. Losing the
    /// race only drops our subscription and has no effect on the connection.
    pub async fn acquire_remote_audio(
        &self,
        connection: &dyn PeerConnection,
        timeout: Duration,
    ) -> CaptureResult<MediaSource> {
        self.set_status(SourceKind::RemoteAudio, SourceStatus::Pending);
        let mut events = connection.subscribe_tracks();

        let result = match self.next_remote_audio(&mut events, timeout).await {
            Ok(Some(source)) => Ok(source),
            Ok(None) => Err(CaptureError::NoTrack),
            Err(e) => Err(e),
        };
        self.settle(SourceKind::RemoteAudio, result)
    }

    /// Wait on an existing subscription for the next stream carrying audio.
    ///
    /// Returns `Ok(None)` once the connection stops announcing tracks. A
    /// timeout leaves the source status untouched so the caller can keep
    /// waiting on the same subscription without missing an announcement.
    pub async fn next_remote_audio(
        &self,
        events: &mut broadcast::Receiver<RemoteTrackEvent>,
        timeout: Duration,
    ) -> CaptureResult<Option<MediaSource>> {
        let arrival = async {
            loop {
                match events.recv().await {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {} remote track notifications", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        let event = match tokio::time::timeout(timeout, arrival).await {
            Err(_) => return Err(CaptureError::Timeout(timeout)),
            Ok(None) => {
                self.set_status(SourceKind::RemoteAudio, SourceStatus::Ended);
                return Ok(None);
            }
            Ok(Some(event)) => event,
        };

        let audio: Vec<_> = event
            .tracks
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Audio && t.is_live())
            .collect();
        if audio.is_empty() {
            self.set_status(SourceKind::RemoteAudio, SourceStatus::Ended);
            return Err(CaptureError::NoTrack);
        }

        tracing::info!(
            "Remote stream {} delivered {} audio tracks",
            event.stream_id,
            audio.len()
        );
        self.set_status(SourceKind::RemoteAudio, SourceStatus::Active);
        Ok(Some(MediaSource::new(SourceKind::RemoteAudio, audio)))
    }

    /// Record the outcome of an acquisition in the status table
    fn settle<T>(&self, kind: SourceKind, result: CaptureResult<T>) -> CaptureResult<T> {
        let status = match &result {
            Ok(_) => SourceStatus::Active,
            Err(CaptureError::PermissionDenied(_)) => SourceStatus::Denied,
            Err(_) => SourceStatus::Ended,
        };
        self.set_status(kind, status);
        result
    }

    fn set_status(&self, kind: SourceKind, status: SourceStatus) {
        self.statuses.lock().insert(kind, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{SimulatedDisplay, SimulatedMicrophone, SimulatedPeerConnection};
    use crate::capture::traits::DisplaySurface;
    use crate::capture::MediaTrack;

    fn acquirer(display: &Arc<SimulatedDisplay>, mic: &Arc<SimulatedMicrophone>) -> SourceAcquirer {
        SourceAcquirer::new(display.clone(), mic.clone(), RecorderConfig::default())
    }

    #[tokio::test]
    async fn test_manual_display_prompts_every_time() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);

        let source = acquirer.acquire_display(CaptureMode::Manual).await.unwrap();
        assert_eq!(source.kind(), SourceKind::Video);
        assert_eq!(source.video_tracks().count(), 1);
        acquirer.acquire_display(CaptureMode::Manual).await.unwrap();

        assert_eq!(display.prompt_count(), 2);
        assert_eq!(acquirer.status(SourceKind::Video), SourceStatus::Active);
        assert!(acquirer.automatic_target().is_none());
        assert_eq!(
            display.last_constraints().map(|c| c.surface),
            Some(DisplaySurface::Window)
        );
    }

    #[tokio::test]
    async fn test_automatic_display_reuses_target_silently() {
        let display = Arc::new(SimulatedDisplay::new().with_silent_reacquire(true));
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);

        let first = acquirer.acquire_display(CaptureMode::Automatic).await.unwrap();
        let second = acquirer.acquire_display(CaptureMode::Automatic).await.unwrap();

        assert_eq!(display.prompt_count(), 1);
        assert_eq!(display.reacquire_count(), 1);
        assert_ne!(first.tracks()[0].id(), second.tracks()[0].id());
        assert_eq!(
            acquirer.automatic_target().map(|t| t.surface),
            Some(DisplaySurface::Browser)
        );
    }

    #[tokio::test]
    async fn test_automatic_display_falls_back_to_prompt() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);

        acquirer.acquire_display(CaptureMode::Automatic).await.unwrap();
        acquirer.acquire_display(CaptureMode::Automatic).await.unwrap();

        assert_eq!(display.prompt_count(), 2);
        assert_eq!(display.reacquire_count(), 0);
    }

    #[tokio::test]
    async fn test_display_permission_denied() {
        let display = Arc::new(SimulatedDisplay::new());
        display.set_denied(true);
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);

        let err = acquirer.acquire_display(CaptureMode::Manual).await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(acquirer.status(SourceKind::Video), SourceStatus::Denied);
    }

    #[tokio::test]
    async fn test_display_without_source() {
        let display = Arc::new(SimulatedDisplay::new());
        display.set_available(false);
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);

        let err = acquirer.acquire_display(CaptureMode::Manual).await.unwrap_err();
        assert!(matches!(err, CaptureError::NoSourceAvailable(_)));
    }

    #[tokio::test]
    async fn test_microphone_denied() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        mic.set_denied(true);
        let acquirer = acquirer(&display, &mic);

        let err = acquirer.acquire_microphone().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(acquirer.status(SourceKind::LocalAudio), SourceStatus::Denied);

        mic.set_denied(false);
        let source = acquirer.acquire_microphone().await.unwrap();
        assert_eq!(source.kind(), SourceKind::LocalAudio);
        assert_eq!(source.audio_tracks().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_audio_times_out_not_earlier() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);
        let peer = SimulatedPeerConnection::new();

        let started = tokio::time::Instant::now();
        let err = acquirer
            .acquire_remote_audio(&peer, Duration::from_millis(5000))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_audio_arrives_before_timeout() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);
        let peer = Arc::new(SimulatedPeerConnection::new());

        let sender = peer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            sender.deliver_audio("remote-voice");
        });

        let source = acquirer
            .acquire_remote_audio(peer.as_ref(), Duration::from_millis(5000))
            .await
            .unwrap();
        assert_eq!(source.kind(), SourceKind::RemoteAudio);
        assert_eq!(source.tracks()[0].label(), "remote-voice");
        assert_eq!(acquirer.status(SourceKind::RemoteAudio), SourceStatus::Active);
    }

    #[tokio::test]
    async fn test_remote_event_without_audio_is_no_track() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);
        let peer = Arc::new(SimulatedPeerConnection::new());

        let sender = peer.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            sender.deliver(vec![MediaTrack::video("remote-camera")]);
        });

        let err = acquirer
            .acquire_remote_audio(peer.as_ref(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::NoTrack));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_remote_audio_keeps_early_announcements() {
        let display = Arc::new(SimulatedDisplay::new());
        let mic = Arc::new(SimulatedMicrophone::new());
        let acquirer = acquirer(&display, &mic);
        let peer = SimulatedPeerConnection::new();
        let mut events = peer.subscribe_tracks();

        // A quiet window does not cost the subscription anything
        let err = acquirer
            .next_remote_audio(&mut events, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
        assert_eq!(acquirer.status(SourceKind::RemoteAudio), SourceStatus::Pending);

        let remote = peer.deliver_audio("remote-voice");
        let source = acquirer
            .next_remote_audio(&mut events, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.tracks(), &[remote]);
        assert_eq!(acquirer.status(SourceKind::RemoteAudio), SourceStatus::Active);

        drop(peer);
        assert!(acquirer
            .next_remote_audio(&mut events, Duration::from_millis(100))
            .await
            .unwrap()
            .is_none());
        assert_eq!(acquirer.status(SourceKind::RemoteAudio), SourceStatus::Ended);
    }
}
