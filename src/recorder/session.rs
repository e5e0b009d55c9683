//! Recording session
//!
//! Owns one composite stream and its recorder for a single start → stop
//! cycle, collects the chunks the recorder emits, and seals them into an
//! artifact when stopped. Sessions are never restarted.

use super::backend::{ChunkSink, MediaRecorder};
use super::composite::CompositeStream;
use super::state::{Artifact, SessionState};
use super::store::ArtifactStore;
use crate::utils::error::{CaptureError, CaptureResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Counts sessions that are currently in the `Recording` state
#[derive(Debug, Clone, Default)]
pub struct RecordingActivity {
    active: Arc<AtomicUsize>,
}

impl RecordingActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active_sessions() > 0
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActivityGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            active: Arc::clone(&self.active),
        }
    }
}

struct ActivityGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

type ChunkBuffer = Arc<Mutex<Vec<Vec<u8>>>>;

/// One start → stop recording cycle
pub struct RecordingSession {
    id: Uuid,
    state: SessionState,
    recorder: Box<dyn MediaRecorder>,
    media_type: String,
    composite: Option<CompositeStream>,
    chunks: ChunkBuffer,
    collector: Option<JoinHandle<()>>,
    flush: CancellationToken,
    artifact: Option<Arc<Artifact>>,
    activity: RecordingActivity,
    guard: Option<ActivityGuard>,
    started_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    /// Create an idle session around a fresh recorder
    pub fn new(recorder: Box<dyn MediaRecorder>, media_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            recorder,
            media_type: media_type.into(),
            composite: None,
            chunks: Arc::new(Mutex::new(Vec::new())),
            collector: None,
            flush: CancellationToken::new(),
            artifact: None,
            activity: RecordingActivity::new(),
            guard: None,
            started_at: None,
        }
    }

    /// Report this session's recording state through `activity`
    pub fn with_activity(mut self, activity: RecordingActivity) -> Self {
        self.activity = activity;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn composite(&self) -> Option<&CompositeStream> {
        self.composite.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Number of non-empty chunks collected so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.lock().iter().map(Vec::len).sum()
    }

    /// The finalized artifact, once stop has produced one
    pub fn artifact(&self) -> Option<Arc<Artifact>> {
        self.artifact.clone()
    }

    /// Start recording `composite`, collecting a chunk every `chunk_interval`.
    ///
    /// Transitions idle → recording. The session owns the composite from
    /// here on; if the recorder fails to start, its tracks are released and
    /// the session stays idle.
    pub async fn start(&mut self, composite: CompositeStream, chunk_interval: Duration) -> CaptureResult<()> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::AlreadyRecording);
        }
        if composite.is_closed() {
            return Err(CaptureError::CompositeClosed);
        }

        let (sink, rx) = ChunkSink::channel();
        let collector = tokio::spawn(collect_chunks(rx, Arc::clone(&self.chunks), self.flush.clone()));

        if let Err(e) = self.recorder.start(composite.clone(), chunk_interval, sink).await {
            tracing::error!("Recorder failed to start for session {}: {}", self.id, e);
            self.flush.cancel();
            let _ = collector.await;
            self.chunks.lock().clear();
            composite.close();
            return Err(e);
        }

        self.collector = Some(collector);
        self.composite = Some(composite);
        self.guard = Some(self.activity.enter());
        self.started_at = Some(Utc::now());
        self.state = SessionState::Recording;

        tracing::info!(
            "Session {} recording ({}ms chunks)",
            self.id,
            chunk_interval.as_millis()
        );
        Ok(())
    }

    /// Stop recording and seal the collected chunks into an artifact.
    ///
    /// Transitions recording → stopping → stopped. The chunks are
    /// concatenated in arrival order and appended to `store`; if the
    /// recorder produced nothing, fails with `ArtifactUnavailable` and
    /// nothing is stored.
    pub async fn stop(&mut self, store: &ArtifactStore) -> CaptureResult<Arc<Artifact>> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }

        self.state = SessionState::Stopping;
        self.guard = None;
        tracing::info!("Stopping session {}", self.id);

        self.wind_down().await;
        self.state = SessionState::Stopped;

        let payload: Vec<u8> = self.chunks.lock().drain(..).flatten().collect();
        if payload.is_empty() {
            tracing::warn!("Session {} produced no payload; nothing stored", self.id);
            return Err(CaptureError::ArtifactUnavailable);
        }

        let session_id = self.id;
        let media_type = self.media_type.clone();
        let artifact = store.append(|index| Artifact::new(index, session_id, media_type, payload));

        tracing::info!(
            "Session {} stopped: artifact #{} ({} bytes)",
            self.id,
            artifact.index(),
            artifact.size()
        );
        self.artifact = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Stop recording and throw away everything collected.
    ///
    /// Transitions recording → stopping → stopped without storing anything.
    pub async fn abort(&mut self) -> CaptureResult<()> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }

        self.state = SessionState::Stopping;
        self.guard = None;
        self.wind_down().await;
        self.chunks.lock().clear();
        self.state = SessionState::Stopped;

        tracing::info!("Session {} aborted", self.id);
        Ok(())
    }

    /// Stop the recorder, drain pending chunks and release the composite
    async fn wind_down(&mut self) {
        if let Err(e) = self.recorder.stop().await {
            tracing::warn!("Recorder for session {} failed to stop cleanly: {}", self.id, e);
        }

        self.flush.cancel();
        if let Some(collector) = self.collector.take() {
            if let Err(e) = collector.await {
                tracing::error!("Chunk collector for session {} failed: {}", self.id, e);
            }
        }

        if let Some(composite) = &self.composite {
            composite.close();
        }
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("media_type", &self.media_type)
            .field("chunks", &self.chunk_count())
            .finish()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.flush.cancel();
        if let Some(composite) = &self.composite {
            if composite.close() > 0 {
                tracing::warn!("Session {} dropped while {}; released its tracks", self.id, self.state);
            }
        }
    }
}

/// Move chunks from the recorder into the session buffer in arrival order.
///
/// Once `flush` fires, whatever is already queued is drained and later
/// chunks are refused.
async fn collect_chunks(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, chunks: ChunkBuffer, flush: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            chunk = rx.recv() => match chunk {
                Some(chunk) => push_chunk(&chunks, chunk),
                None => return,
            },
            _ = flush.cancelled() => break,
        }
    }

    rx.close();
    while let Some(chunk) = rx.recv().await {
        push_chunk(&chunks, chunk);
    }
}

fn push_chunk(chunks: &Mutex<Vec<Vec<u8>>>, chunk: Vec<u8>) {
    if !chunk.is_empty() {
        chunks.lock().push(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::{MediaSource, SourceKind};
    use crate::capture::track::MediaTrack;
    use crate::recorder::composite::StreamComposer;
    use crate::recorder::simulated::SimulatedRecorder;

    fn composite(composer: &StreamComposer) -> (CompositeStream, MediaTrack, MediaTrack) {
        let screen = MediaTrack::video("screen");
        let mic = MediaTrack::audio("mic");
        let stream = composer.compose(&[
            MediaSource::new(SourceKind::Video, vec![screen.clone()]),
            MediaSource::new(SourceKind::LocalAudio, vec![mic.clone()]),
        ]);
        (stream, screen, mic)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_produces_artifact() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let (stream, screen, mic) = composite(&composer);

        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.started_at().is_none());

        session.start(stream, Duration::from_millis(100)).await.unwrap();
        assert_eq!(session.state(), SessionState::Recording);
        let started_at = session.started_at().unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        // Header plus three timeslices
        assert_eq!(session.chunk_count(), 4);

        let artifact = session.stop(&store).await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(artifact.index(), 1);
        assert_eq!(artifact.media_type(), "video/webm");
        assert_eq!(artifact.session_id(), session.id());
        assert!(artifact.created_at() >= started_at);
        assert_eq!(session.chunk_count(), 0);
        assert_eq!(session.artifact().map(|a| a.index()), Some(1));
        assert_eq!(store.len(), 1);

        let text = String::from_utf8(artifact.payload().to_vec()).unwrap();
        assert!(text.starts_with("HEADER video/webm\n"));
        assert_eq!(text.matches("video screen").count(), 4);

        // The session released its tracks
        assert!(!screen.is_live());
        assert!(!mic.is_live());
    }

    #[tokio::test]
    async fn test_debug_reports_state() {
        let composer = StreamComposer::new();
        let (stream, _, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream, Duration::from_secs(1)).await.unwrap();

        let debug = format!("{:?}", session);
        assert!(debug.contains(&session.id().to_string()));
        assert!(debug.contains("Recording"));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let composer = StreamComposer::new();
        let (stream, _, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream, Duration::from_secs(1)).await.unwrap();
        let before = session.chunk_count();

        let (other, other_screen, _) = composite(&composer);
        let err = session.start(other, Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, CaptureError::AlreadyRecording));
        assert_eq!(session.state(), SessionState::Recording);
        assert_eq!(session.chunk_count(), before);
        assert!(other_screen.is_live());
    }

    #[tokio::test]
    async fn test_stop_when_not_recording() {
        let store = ArtifactStore::new();
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        assert!(matches!(session.stop(&store).await, Err(CaptureError::NotRecording)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_twice_is_rejected() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let (stream, _, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream, Duration::from_secs(1)).await.unwrap();

        session.stop(&store).await.unwrap();
        assert!(matches!(session.stop(&store).await, Err(CaptureError::NotRecording)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_recording_is_unavailable() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let (stream, screen, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::silent("video/webm")), "video/webm");
        session.start(stream, Duration::from_millis(10)).await.unwrap();

        let err = session.stop(&store).await.unwrap_err();
        assert!(matches!(err, CaptureError::ArtifactUnavailable));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.artifact().is_none());
        assert!(store.is_empty());
        assert!(!screen.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_track_is_recorded() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let (stream, _, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream.clone(), Duration::from_millis(100)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let remote = MediaTrack::audio("remote");
        composer.add_track_live(&stream, remote.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let artifact = session.stop(&store).await.unwrap();
        let text = String::from_utf8(artifact.payload().to_vec()).unwrap();
        assert!(text.contains("video screen"));
        assert!(text.contains("audio mic"));
        assert!(text.contains(&format!("audio remote {}", remote.id())));
        assert!(!remote.is_live());
    }

    #[tokio::test]
    async fn test_abort_discards_chunks() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let (stream, screen, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream, Duration::from_secs(1)).await.unwrap();

        session.abort().await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.chunk_count(), 0);
        assert!(store.is_empty());
        assert!(!screen.is_live());
    }

    #[tokio::test]
    async fn test_activity_tracks_recording_state() {
        let composer = StreamComposer::new();
        let store = ArtifactStore::new();
        let activity = RecordingActivity::new();
        let (stream, _, _) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm")
            .with_activity(activity.clone());

        assert!(!activity.is_active());
        session.start(stream, Duration::from_secs(1)).await.unwrap();
        assert_eq!(activity.active_sessions(), 1);
        session.stop(&store).await.unwrap();
        assert!(!activity.is_active());
    }

    #[tokio::test]
    async fn test_start_with_closed_composite() {
        let composer = StreamComposer::new();
        let (stream, _, _) = composite(&composer);
        stream.close();
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");

        let err = session.start(stream, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CaptureError::CompositeClosed));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let composer = StreamComposer::new();
        let (stream, screen, mic) = composite(&composer);
        let mut session = RecordingSession::new(Box::new(SimulatedRecorder::new("video/webm")), "video/webm");
        session.start(stream, Duration::from_secs(1)).await.unwrap();

        drop(session);
        assert!(!screen.is_live());
        assert!(!mic.is_live());
    }
}
