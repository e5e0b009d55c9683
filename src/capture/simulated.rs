//! In-process capture backend
//!
//! Stands in for the OS capture primitives: grants synthetic tracks, can be
//! told to deny permission or to have nothing to offer, and counts prompts so
//! callers can observe silent re-acquisition.

use super::track::MediaTrack;
use super::traits::{
    AudioConstraints, DisplayCapture, DisplayConstraints, DisplayGrant, DisplaySurface,
    DisplayTarget, MicrophoneCapture, PeerConnection, RemoteTrackEvent,
};
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Default)]
struct DisplayState {
    denied: bool,
    unavailable: bool,
    prompts: usize,
    reacquires: usize,
    last_constraints: Option<DisplayConstraints>,
    granted: Vec<MediaTrack>,
}

/// Simulated display capture
pub struct SimulatedDisplay {
    state: Mutex<DisplayState>,
    silent_reacquire: bool,
    prompt_delay: Option<Duration>,
}

impl SimulatedDisplay {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DisplayState::default()),
            silent_reacquire: false,
            prompt_delay: None,
        }
    }

    /// Allow granting a known target again without a prompt
    pub fn with_silent_reacquire(mut self, supported: bool) -> Self {
        self.silent_reacquire = supported;
        self
    }

    /// Delay every grant, as if waiting on the user
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    /// Make subsequent prompts fail as dismissed
    pub fn set_denied(&self, denied: bool) {
        self.state.lock().denied = denied;
    }

    /// Make subsequent requests find nothing to capture
    pub fn set_available(&self, available: bool) {
        self.state.lock().unavailable = !available;
    }

    pub fn prompt_count(&self) -> usize {
        self.state.lock().prompts
    }

    pub fn reacquire_count(&self) -> usize {
        self.state.lock().reacquires
    }

    pub fn last_constraints(&self) -> Option<DisplayConstraints> {
        self.state.lock().last_constraints.clone()
    }

    /// Every track this display has handed out, oldest first
    pub fn granted_tracks(&self) -> Vec<MediaTrack> {
        self.state.lock().granted.clone()
    }

    /// Withdraw the share: every track handed out so far ends
    pub fn revoke(&self) {
        let granted = self.state.lock().granted.clone();
        for track in granted {
            track.stop();
        }
    }

    fn target_for(surface: DisplaySurface) -> DisplayTarget {
        let (id, name) = match surface {
            DisplaySurface::Monitor => ("monitor-0", "Primary Display"),
            DisplaySurface::Window => ("window-1", "Meeting Window"),
            DisplaySurface::Browser => ("tab-1", "Current Tab"),
        };
        DisplayTarget {
            id: id.to_string(),
            name: name.to_string(),
            surface,
        }
    }

    fn grant(&self, target: DisplayTarget, constraints: &DisplayConstraints) -> DisplayGrant {
        let mut tracks = vec![MediaTrack::video(target.name.clone())];
        if constraints.audio.is_some() {
            tracks.push(MediaTrack::audio(format!("{} audio", target.name)));
        }

        let mut state = self.state.lock();
        state.granted.extend(tracks.iter().cloned());
        state.last_constraints = Some(constraints.clone());
        DisplayGrant { target, tracks }
    }

    async fn wait_for_user(&self) {
        if let Some(delay) = self.prompt_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for SimulatedDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplayCapture for SimulatedDisplay {
    async fn request(&self, constraints: &DisplayConstraints) -> CaptureResult<DisplayGrant> {
        self.state.lock().prompts += 1;
        self.wait_for_user().await;

        {
            let state = self.state.lock();
            if state.denied {
                return Err(CaptureError::PermissionDenied(
                    "display capture prompt was dismissed".to_string(),
                ));
            }
            if state.unavailable {
                return Err(CaptureError::NoSourceAvailable(
                    "no display surface to capture".to_string(),
                ));
            }
        }

        Ok(self.grant(Self::target_for(constraints.surface), constraints))
    }

    fn supports_silent_reacquire(&self) -> bool {
        self.silent_reacquire
    }

    async fn reacquire(
        &self,
        target: &DisplayTarget,
        constraints: &DisplayConstraints,
    ) -> CaptureResult<DisplayGrant> {
        if !self.silent_reacquire {
            return Err(CaptureError::Platform(
                "silent re-acquisition is not supported".to_string(),
            ));
        }
        self.state.lock().reacquires += 1;
        self.wait_for_user().await;

        if self.state.lock().unavailable {
            return Err(CaptureError::NoSourceAvailable(format!(
                "'{}' is no longer available",
                target.name
            )));
        }

        Ok(self.grant(target.clone(), constraints))
    }
}

#[derive(Default)]
struct MicrophoneState {
    denied: bool,
    requests: usize,
    granted: Vec<MediaTrack>,
}

/// Simulated microphone
#[derive(Default)]
pub struct SimulatedMicrophone {
    state: Mutex<MicrophoneState>,
}

impl SimulatedMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_denied(&self, denied: bool) {
        self.state.lock().denied = denied;
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests
    }

    pub fn granted_tracks(&self) -> Vec<MediaTrack> {
        self.state.lock().granted.clone()
    }
}

#[async_trait]
impl MicrophoneCapture for SimulatedMicrophone {
    async fn request(&self, constraints: &AudioConstraints) -> CaptureResult<Vec<MediaTrack>> {
        let mut state = self.state.lock();
        state.requests += 1;

        if state.denied {
            return Err(CaptureError::PermissionDenied(
                "microphone access was blocked".to_string(),
            ));
        }

        let label = match constraints.sample_rate {
            Some(rate) => format!("Default Microphone @ {rate}Hz"),
            None => "Default Microphone".to_string(),
        };
        let track = MediaTrack::audio(label);
        state.granted.push(track.clone());
        Ok(vec![track])
    }
}

/// Simulated connected peer
pub struct SimulatedPeerConnection {
    events: broadcast::Sender<RemoteTrackEvent>,
}

impl SimulatedPeerConnection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { events }
    }

    /// Announce a remote stream carrying `tracks`
    pub fn deliver(&self, tracks: Vec<MediaTrack>) {
        let event = RemoteTrackEvent {
            stream_id: uuid::Uuid::new_v4().to_string(),
            tracks,
        };
        // Nobody listening is fine; the peer does not wait for us.
        let _ = self.events.send(event);
    }

    /// Announce a remote stream with a single audio track and return it
    pub fn deliver_audio(&self, label: &str) -> MediaTrack {
        let track = MediaTrack::audio(label);
        self.deliver(vec![track.clone()]);
        track
    }
}

impl Default for SimulatedPeerConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerConnection for SimulatedPeerConnection {
    fn subscribe_tracks(&self) -> broadcast::Receiver<RemoteTrackEvent> {
        self.events.subscribe()
    }
}
