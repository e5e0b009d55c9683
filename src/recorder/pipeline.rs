//! Segment pipeline
//!
//! Wires acquisition, composition and recording together: every call to
//! [`CapturePipeline::open_segment`] acquires fresh sources, composes them
//! and hands back a session that is already recording.

use super::backend::RecorderProvider;
use super::composite::{CompositeStream, StreamComposer};
use super::coordinator::RecorderEvent;
use super::session::{RecordingActivity, RecordingSession};
use super::state::Artifact;
use super::store::ArtifactStore;
use crate::capture::acquirer::{CaptureMode, SourceAcquirer};
use crate::capture::track::MediaTrack;
use crate::capture::traits::{DisplayCapture, MicrophoneCapture, PeerConnection, RemoteTrackEvent};
use crate::config::RecorderConfig;
use crate::utils::error::{CaptureError, CaptureResult, ErrorResponse};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 100;

/// Shared plumbing behind manual and rotated recordings
pub struct CapturePipeline {
    config: RecorderConfig,
    acquirer: SourceAcquirer,
    composer: StreamComposer,
    recorders: Arc<dyn RecorderProvider>,
    store: Arc<ArtifactStore>,
    peer_link: Mutex<Option<CancellationToken>>,
    /// Latest remote audio announced by the peer
    remote: RwLock<Vec<MediaTrack>>,
    /// Composites that may still take remote audio
    live: Mutex<Vec<CompositeStream>>,
    events: broadcast::Sender<RecorderEvent>,
    activity: RecordingActivity,
}

impl CapturePipeline {
    pub fn new(
        config: RecorderConfig,
        display: Arc<dyn DisplayCapture>,
        microphone: Arc<dyn MicrophoneCapture>,
        recorders: Arc<dyn RecorderProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            acquirer: SourceAcquirer::new(display, microphone, config.clone()),
            config,
            composer: StreamComposer::new(),
            recorders,
            store: Arc::new(ArtifactStore::new()),
            peer_link: Mutex::new(None),
            remote: RwLock::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            events,
            activity: RecordingActivity::new(),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn acquirer(&self) -> &SourceAcquirer {
        &self.acquirer
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn activity(&self) -> &RecordingActivity {
        &self.activity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Follow `peer` for remote audio, replacing any peer attached before.
    ///
    /// The subscription is taken right away, so a stream the peer announces
    /// before the next segment starts is still picked up. The latest remote
    /// audio joins every composite opened from then on. Must be called from
    /// within a tokio runtime.
    pub fn attach_peer(self: &Arc<Self>, peer: Arc<dyn PeerConnection>) {
        let events = peer.subscribe_tracks();
        let cancel = CancellationToken::new();
        if let Some(previous) = self.peer_link.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        self.remote.write().clear();

        tokio::spawn(Arc::clone(self).follow_peer(events, cancel));
    }

    /// Stop following the attached peer.
    ///
    /// Remote tracks already lent to a recording composite stay there until
    /// it closes; later composites start without them.
    pub fn detach_peer(&self) {
        if let Some(link) = self.peer_link.lock().take() {
            link.cancel();
            tracing::debug!("Detached remote peer");
        }
        self.remote.write().clear();
    }

    async fn follow_peer(self: Arc<Self>, mut events: broadcast::Receiver<RemoteTrackEvent>, cancel: CancellationToken) {
        let timeout = self.config.remote_audio_timeout();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.acquirer.next_remote_audio(&mut events, timeout) => next,
            };

            match next {
                Ok(Some(_)) if cancel.is_cancelled() => break,
                Ok(Some(source)) => {
                    *self.remote.write() = source.tracks().to_vec();
                    self.share_remote_audio();
                }
                Ok(None) => {
                    tracing::info!("Remote peer closed; recording continues without it");
                    break;
                }
                Err(CaptureError::Timeout(_)) => {
                    if self.activity.is_active() {
                        tracing::debug!("No remote audio within {}ms", timeout.as_millis());
                    }
                }
                Err(e) => {
                    tracing::warn!("Remote audio unavailable: {}", e);
                    if e.is_user_notice() && self.activity.is_active() && !cancel.is_cancelled() {
                        self.notify(&e);
                    }
                }
            }
        }
        tracing::debug!("Stopped following remote peer");
    }

    /// Lend the current remote audio to every composite still recording
    fn share_remote_audio(&self) {
        let remote: Vec<MediaTrack> = {
            let mut remote = self.remote.write();
            remote.retain(MediaTrack::is_live);
            remote.clone()
        };

        let mut live = self.live.lock();
        live.retain(|composite| !composite.is_closed());
        if remote.is_empty() {
            return;
        }

        for composite in live.iter() {
            for track in remote.iter().filter(|t| !composite.contains(t)) {
                match self.composer.lend_track_live(composite, track.clone()) {
                    Ok(()) => tracing::info!("Remote track {} joined composite {}", track.label(), composite.id()),
                    // Still claimed by a composite that is winding down
                    Err(e) => tracing::debug!("Remote track {} not shared yet: {}", track.label(), e),
                }
            }
        }
    }

    pub(crate) fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Surface a failure to the UI collaborator
    pub(crate) fn notify(&self, error: &CaptureError) {
        self.emit(RecorderEvent::Notice(ErrorResponse::from(error)));
    }

    /// Acquire sources, compose them and start recording a new segment.
    ///
    /// The display is required: if it cannot be acquired the error is
    /// reported and nothing is started. A missing microphone only produces a
    /// notice. Remote audio from the attached peer joins as soon as it is
    /// available, whether it arrived earlier or arrives later.
    pub async fn open_segment(self: &Arc<Self>, mode: CaptureMode) -> CaptureResult<RecordingSession> {
        let display = match self.acquirer.acquire_display(mode).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("Display capture failed: {}", e);
                self.notify(&e);
                return Err(e);
            }
        };

        let mut sources = vec![display];
        if self.config.capture_microphone {
            match self.acquirer.acquire_microphone().await {
                Ok(source) => sources.push(source),
                Err(e) => {
                    tracing::warn!("Recording without microphone: {}", e);
                    self.notify(&e);
                }
            }
        }

        let composite = self.composer.compose(&sources);
        let recorder = match self.recorders.create_recorder(&self.config.recorder_mime_type) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::error!("Failed to create recorder: {}", e);
                composite.close();
                return Err(e);
            }
        };

        let mut session = RecordingSession::new(recorder, self.config.artifact_media_type.clone())
            .with_activity(self.activity.clone());
        session.start(composite.clone(), self.config.chunk_interval()).await?;

        self.live.lock().push(composite);
        self.share_remote_audio();
        self.emit(RecorderEvent::SessionStarted {
            session_id: session.id(),
            mode,
        });

        Ok(session)
    }

    /// Stop `session` and commit its artifact.
    ///
    /// An empty recording is reported as a notice and contributes nothing.
    pub async fn finalize(&self, session: &mut RecordingSession) -> CaptureResult<Arc<Artifact>> {
        let result = session.stop(&self.store).await;
        if matches!(result, Err(CaptureError::NotRecording)) {
            return result;
        }
        self.share_remote_audio();

        self.emit(RecorderEvent::SessionStopped {
            session_id: session.id(),
        });
        match &result {
            Ok(artifact) => self.emit(RecorderEvent::ArtifactCommitted(artifact.summary())),
            Err(e) => {
                tracing::warn!("Segment {} contributed no artifact: {}", session.id(), e);
                self.notify(e);
            }
        }
        result
    }

    /// Stop `session` without committing anything
    pub async fn discard(&self, session: &mut RecordingSession) {
        if let Err(e) = session.abort().await {
            tracing::debug!("Nothing to discard for session {}: {}", session.id(), e);
            return;
        }
        self.share_remote_audio();
        self.emit(RecorderEvent::SessionStopped {
            session_id: session.id(),
        });
    }
}
