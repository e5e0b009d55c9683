//! Media tracks
//!
//! A track is one live audio or video feed handed out by the platform.
//! Clones share the same underlying feed, so stopping any clone ends it for
//! every holder, and the ended transition can be awaited.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// Lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    state: watch::Sender<TrackState>,
}

/// Handle to a platform media track
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a new live track with a fresh, globally unique id
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label: label.into(),
                state,
            }),
        }
    }

    pub fn video(label: impl Into<String>) -> Self {
        Self::new(TrackKind::Video, label)
    }

    pub fn audio(label: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, label)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// End the track.
    ///
    /// Used both for explicit release and for platform-side revocation
    /// (screen share withdrawn, device unplugged). Returns `true` if this
    /// call performed the transition.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        });
        if stopped {
            tracing::debug!("Track ended: {} {} ({})", self.kind(), self.label(), self.id());
        }
        stopped
    }

    /// Resolves once the track has ended
    pub async fn ended(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state == TrackState::Ended).await;
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}
