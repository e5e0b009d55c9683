//! Composite streams
//!
//! Merges the tracks of several sources into one recordable stream. A
//! composite holds at most one live video track and any number of audio
//! tracks, and a track belongs to at most one composite at a time.
//!
//! Tracks from the local display and microphone are owned by the composite
//! and stopped when it closes. Remote peer tracks are only borrowed: closing
//! releases the claim and leaves them running for the next composite.

use crate::capture::source::MediaSource;
use crate::capture::track::{MediaTrack, TrackKind};
use crate::utils::error::{CaptureError, CaptureResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Track ids currently claimed by a live composite
type TrackRegistry = Arc<Mutex<HashSet<Uuid>>>;

struct CompositeInner {
    tracks: Vec<MediaTrack>,
    borrowed: HashSet<Uuid>,
    closed: bool,
}

/// Shared handle to one composite stream
///
/// Clones refer to the same stream; the recorder reads it while the
/// composer may still append late tracks.
#[derive(Clone)]
pub struct CompositeStream {
    id: Uuid,
    inner: Arc<Mutex<CompositeInner>>,
    registry: TrackRegistry,
}

impl CompositeStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of every track, in composition order
    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.inner.lock().tracks.clone()
    }

    /// Snapshot of the tracks that are still live
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        self.inner
            .lock()
            .tracks
            .iter()
            .filter(|t| t.is_live())
            .cloned()
            .collect()
    }

    pub fn video_track(&self) -> Option<MediaTrack> {
        self.inner
            .lock()
            .tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video && t.is_live())
            .cloned()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.inner
            .lock()
            .tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Whether `track` is part of this composite
    pub fn contains(&self, track: &MediaTrack) -> bool {
        self.inner.lock().tracks.iter().any(|t| t.id() == track.id())
    }

    /// Stop every owned track, release every claim and refuse further mutation.
    ///
    /// Returns the number of tracks this call stopped; closing twice is a no-op.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }
        inner.closed = true;

        let mut registry = self.registry.lock();
        let mut stopped = 0;
        for track in &inner.tracks {
            registry.remove(&track.id());
            if inner.borrowed.contains(&track.id()) {
                continue;
            }
            if track.stop() {
                stopped += 1;
            }
        }

        tracing::debug!("Closed composite {} ({} tracks stopped)", self.id, stopped);
        stopped
    }
}

impl std::fmt::Debug for CompositeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CompositeStream")
            .field("id", &self.id)
            .field("tracks", &inner.tracks)
            .field("borrowed", &inner.borrowed.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Builds composite streams and appends tracks to them
#[derive(Default)]
pub struct StreamComposer {
    registry: TrackRegistry,
}

impl StreamComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `sources` into a new composite.
    ///
    /// Video tracks come first, then audio tracks; within each group the
    /// order follows the sources and each source's own track order. Ended
    /// tracks, extra video tracks and tracks already claimed elsewhere are
    /// left out.
    pub fn compose(&self, sources: &[MediaSource]) -> CompositeStream {
        let videos = sources.iter().flat_map(|s| s.video_tracks());
        let audios = sources.iter().flat_map(|s| s.audio_tracks());

        let mut tracks: Vec<MediaTrack> = Vec::new();
        let mut has_video = false;
        {
            let mut registry = self.registry.lock();
            for track in videos.chain(audios) {
                if !track.is_live() {
                    tracing::warn!("Skipping ended track {}", track.label());
                    continue;
                }
                if track.kind() == TrackKind::Video && has_video {
                    tracing::warn!("Skipping extra video track {}", track.label());
                    continue;
                }
                if !registry.insert(track.id()) {
                    tracing::warn!("Track {} already belongs to another composite", track.label());
                    continue;
                }
                has_video |= track.kind() == TrackKind::Video;
                tracks.push(track.clone());
            }
        }

        let composite = CompositeStream {
            id: Uuid::new_v4(),
            inner: Arc::new(Mutex::new(CompositeInner {
                tracks,
                borrowed: HashSet::new(),
                closed: false,
            })),
            registry: Arc::clone(&self.registry),
        };

        tracing::debug!(
            "Composed stream {} from {} sources ({} tracks)",
            composite.id,
            sources.len(),
            composite.tracks().len()
        );
        composite
    }

    /// Append a track to a composite that may already be recording.
    ///
    /// The composite takes ownership and stops the track when it closes.
    /// Fails with `CompositeClosed` instead of touching a finalized stream.
    pub fn add_track_live(&self, composite: &CompositeStream, track: MediaTrack) -> CaptureResult<()> {
        self.insert_live(composite, track, false)
    }

    /// Append a track the composite only borrows, such as remote peer audio.
    ///
    /// Closing the composite releases the claim without stopping the track.
    pub fn lend_track_live(&self, composite: &CompositeStream, track: MediaTrack) -> CaptureResult<()> {
        self.insert_live(composite, track, true)
    }

    fn insert_live(&self, composite: &CompositeStream, track: MediaTrack, borrowed: bool) -> CaptureResult<()> {
        let mut inner = composite.inner.lock();
        if inner.closed {
            tracing::error!(
                "Refusing to add {} track {} to closed composite {}",
                track.kind(),
                track.label(),
                composite.id
            );
            return Err(CaptureError::CompositeClosed);
        }
        if !track.is_live() {
            return Err(CaptureError::InvalidTrack(format!("{} has already ended", track.label())));
        }
        if track.kind() == TrackKind::Video
            && inner.tracks.iter().any(|t| t.kind() == TrackKind::Video && t.is_live())
        {
            return Err(CaptureError::InvalidTrack(format!(
                "composite {} already has a live video track",
                composite.id
            )));
        }
        if !self.registry.lock().insert(track.id()) {
            return Err(CaptureError::InvalidTrack(format!(
                "{} already belongs to a composite",
                track.label()
            )));
        }

        tracing::info!("Added live {} track {} to composite {}", track.kind(), track.label(), composite.id);
        if borrowed {
            inner.borrowed.insert(track.id());
        }
        inner.tracks.push(track);
        Ok(())
    }
}
