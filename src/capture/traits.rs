//! Capture trait definitions
//!
//! Platform-agnostic traits for the capture primitives the recorder consumes,
//! and the constraint types passed to them.

use super::track::MediaTrack;
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which kind of display surface a capture may target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySurface {
    /// A whole monitor
    Monitor,
    /// Any application window
    Window,
    /// A browser tab
    Browser,
}

/// Cursor rendering in captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorVisibility {
    Always,
    Motion,
    Never,
}

/// Processing hints for an audio capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: Option<u32>,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: Some(44100),
        }
    }
}

/// Constraints for a display capture request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConstraints {
    /// Restrict the picker to this surface kind
    pub surface: DisplaySurface,

    /// Capture the logical surface (the full tab/window, including hidden parts)
    pub logical_surface: bool,

    /// Offer the current tab first, skipping the picker where supported
    pub prefer_current_tab: bool,

    pub cursor: CursorVisibility,

    /// Capture the surface's audio, if any
    pub audio: Option<AudioConstraints>,
}

/// Logical capture target chosen by the user
///
/// Stable across re-acquisitions of the same surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayTarget {
    pub id: String,
    pub name: String,
    pub surface: DisplaySurface,
}

/// Result of a successful display capture request
#[derive(Debug, Clone)]
pub struct DisplayGrant {
    pub target: DisplayTarget,
    pub tracks: Vec<MediaTrack>,
}

/// Display capture primitive
///
/// Each `request` may show a user-facing permission prompt.
#[async_trait]
pub trait DisplayCapture: Send + Sync {
    /// Ask for a display surface matching `constraints`
    async fn request(&self, constraints: &DisplayConstraints) -> CaptureResult<DisplayGrant>;

    /// Whether `reacquire` can grant the same target again without prompting
    fn supports_silent_reacquire(&self) -> bool {
        false
    }

    /// Capture a previously granted target again without prompting
    async fn reacquire(
        &self,
        target: &DisplayTarget,
        _constraints: &DisplayConstraints,
    ) -> CaptureResult<DisplayGrant> {
        Err(CaptureError::Platform(format!(
            "silent re-acquisition of '{}' is not supported",
            target.name
        )))
    }
}

/// Microphone capture primitive
///
/// `request` may show a user-facing permission prompt.
#[async_trait]
pub trait MicrophoneCapture: Send + Sync {
    async fn request(&self, constraints: &AudioConstraints) -> CaptureResult<Vec<MediaTrack>>;
}

/// Track-received notification from a connected peer
#[derive(Debug, Clone)]
pub struct RemoteTrackEvent {
    /// Id of the remote stream the tracks belong to
    pub stream_id: String,

    /// Tracks of that stream, in the order the peer announced them
    pub tracks: Vec<MediaTrack>,
}

/// Already-connected peer connection
///
/// The recorder only listens for incoming tracks; connection setup and
/// teardown belong to the signaling layer.
pub trait PeerConnection: Send + Sync {
    /// Subscribe to track-received notifications
    fn subscribe_tracks(&self) -> broadcast::Receiver<RemoteTrackEvent>;
}
