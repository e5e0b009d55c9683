//! Recorder configuration
//!
//! All fields have defaults, so an empty JSON object is a valid config.

use crate::capture::acquirer::CaptureMode;
use crate::capture::traits::{AudioConstraints, CursorVisibility, DisplayConstraints, DisplaySurface};
use crate::utils::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default rotation period (5 minutes)
pub const DEFAULT_ROTATION_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Default recorder timeslice
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 1000;

/// Default wait for a remote audio track
pub const DEFAULT_REMOTE_AUDIO_TIMEOUT_MS: u64 = 5000;

/// Configuration for capture and rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Period between automatic rotations
    pub rotation_interval_ms: u64,

    /// How often the recorder emits a chunk while recording
    pub chunk_interval_ms: u64,

    /// How long to wait for a remote peer's audio track
    pub remote_audio_timeout_ms: u64,

    /// Format requested from the recorder
    pub recorder_mime_type: String,

    /// Media type stamped on finalized artifacts
    pub artifact_media_type: String,

    /// Whether to request the local microphone
    pub capture_microphone: bool,

    /// Whether to request the display surface's own audio
    pub capture_display_audio: bool,

    /// Hide the cursor in captured frames
    pub hide_cursor: bool,

    /// Surface offered when the user starts a manual capture
    pub manual_surface: DisplaySurface,

    /// Surface used for rotated captures
    pub automatic_surface: DisplaySurface,

    /// Microphone processing hints
    pub microphone: AudioConstraints,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            rotation_interval_ms: DEFAULT_ROTATION_INTERVAL_MS,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            remote_audio_timeout_ms: DEFAULT_REMOTE_AUDIO_TIMEOUT_MS,
            recorder_mime_type: "video/webm;codecs=vp9,opus".to_string(),
            artifact_media_type: "video/webm".to_string(),
            capture_microphone: true,
            capture_display_audio: true,
            hide_cursor: true,
            manual_surface: DisplaySurface::Window,
            automatic_surface: DisplaySurface::Browser,
            microphone: AudioConstraints::default(),
        }
    }
}

impl RecorderConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> CaptureResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded recorder config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.rotation_interval_ms == 0 {
            return Err(CaptureError::Configuration(
                "rotation interval must be positive".to_string(),
            ));
        }
        if self.chunk_interval_ms == 0 {
            return Err(CaptureError::Configuration(
                "chunk interval must be positive".to_string(),
            ));
        }
        if self.recorder_mime_type.trim().is_empty() || self.artifact_media_type.trim().is_empty() {
            return Err(CaptureError::Configuration(
                "media types must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn remote_audio_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_audio_timeout_ms)
    }

    /// Display constraints for a capture in the given mode
    pub fn display_constraints(&self, mode: CaptureMode) -> DisplayConstraints {
        let cursor = if self.hide_cursor {
            CursorVisibility::Never
        } else {
            CursorVisibility::Always
        };

        match mode {
            CaptureMode::Manual => DisplayConstraints {
                surface: self.manual_surface,
                logical_surface: false,
                prefer_current_tab: false,
                cursor,
                audio: self.capture_display_audio.then(|| self.microphone.clone()),
            },
            // Rotated captures keep the same tab and take the platform's audio defaults
            CaptureMode::Automatic => DisplayConstraints {
                surface: self.automatic_surface,
                logical_surface: true,
                prefer_current_tab: true,
                cursor,
                audio: self.capture_display_audio.then_some(AudioConstraints {
                    echo_cancellation: false,
                    noise_suppression: false,
                    sample_rate: None,
                }),
            },
        }
    }
}
