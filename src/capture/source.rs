//! Captured media sources
//!
//! A source groups the tracks produced by one acquisition (one display
//! grant, one microphone grant, one remote peer stream).

use super::track::{MediaTrack, TrackKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a source's tracks come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Video,
    LocalAudio,
    RemoteAudio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Video => write!(f, "video"),
            SourceKind::LocalAudio => write!(f, "local-audio"),
            SourceKind::RemoteAudio => write!(f, "remote-audio"),
        }
    }
}

/// Acquisition status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Pending,
    Active,
    Denied,
    Ended,
}

/// One captured stream of one kind
#[derive(Debug, Clone)]
pub struct MediaSource {
    kind: SourceKind,
    tracks: Vec<MediaTrack>,
}

impl MediaSource {
    /// Wrap freshly granted tracks
    pub fn new(kind: SourceKind, tracks: Vec<MediaTrack>) -> Self {
        Self { kind, tracks }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// `Active` while any track is live, `Ended` once every track has ended
    pub fn status(&self) -> SourceStatus {
        if self.tracks.iter().any(MediaTrack::is_live) {
            SourceStatus::Active
        } else {
            SourceStatus::Ended
        }
    }

    /// Release every track of this source
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Resolves once every track of this source has ended
    pub async fn ended(&self) {
        for track in &self.tracks {
            track.ended().await;
        }
    }
}
