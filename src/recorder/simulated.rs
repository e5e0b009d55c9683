//! In-process recorder
//!
//! Encodes a line per live track of the composite on every timeslice, so a
//! finished payload shows exactly which tracks were recorded and when.

use super::backend::{ChunkSink, MediaRecorder, RecorderProvider};
use super::composite::CompositeStream;
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Simulated recorder
pub struct SimulatedRecorder {
    mime_type: String,
    silent: bool,
    running: bool,
    stop_delay: Option<Duration>,
    stream: Option<CompositeStream>,
    sink: Option<ChunkSink>,
    cancel: CancellationToken,
    emitter: Option<JoinHandle<()>>,
}

impl SimulatedRecorder {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            silent: false,
            running: false,
            stop_delay: None,
            stream: None,
            sink: None,
            cancel: CancellationToken::new(),
            emitter: None,
        }
    }

    /// A recorder that never produces any data
    pub fn silent(mime_type: impl Into<String>) -> Self {
        let mut recorder = Self::new(mime_type);
        recorder.silent = true;
        recorder
    }

    /// Take `delay` to produce the final payload on stop
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    /// One line per live track: `<kind> <label> <id>`
    pub fn encode_frame(stream: &CompositeStream) -> Vec<u8> {
        stream
            .live_tracks()
            .iter()
            .map(|t| format!("{} {} {}\n", t.kind(), t.label(), t.id()))
            .collect::<String>()
            .into_bytes()
    }
}

#[async_trait]
impl MediaRecorder for SimulatedRecorder {
    async fn start(
        &mut self,
        stream: CompositeStream,
        timeslice: Duration,
        sink: ChunkSink,
    ) -> CaptureResult<()> {
        if self.running {
            return Err(CaptureError::AlreadyRecording);
        }
        self.running = true;
        if self.silent {
            return Ok(());
        }

        sink.emit(format!("HEADER {}\n", self.mime_type).into_bytes());

        let cancel = self.cancel.clone();
        let task_stream = stream.clone();
        let task_sink = sink.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if !task_sink.emit(SimulatedRecorder::encode_frame(&task_stream)) {
                            break;
                        }
                    }
                }
            }
        });

        self.stream = Some(stream);
        self.sink = Some(sink);
        self.emitter = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        if !self.running {
            return Err(CaptureError::NotRecording);
        }
        self.running = false;

        self.cancel.cancel();
        if let Some(handle) = self.emitter.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Simulated recorder emitter failed: {}", e);
            }
        }

        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }

        // Final flush
        if let (Some(sink), Some(stream)) = (self.sink.take(), self.stream.take()) {
            sink.emit(Self::encode_frame(&stream));
        }
        Ok(())
    }
}

impl Drop for SimulatedRecorder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Hands out simulated recorders
///
/// Recorders are numbered from 1 in creation order; numbers marked silent
/// get a recorder that never produces data.
#[derive(Default)]
pub struct SimulatedRecorderProvider {
    created: AtomicUsize,
    silent: Mutex<HashSet<usize>>,
    stop_delay: Option<Duration>,
}

impl SimulatedRecorderProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the recorders with these creation numbers produce no data
    pub fn with_silent_recorders(self, numbers: impl IntoIterator<Item = usize>) -> Self {
        self.silent.lock().extend(numbers);
        self
    }

    /// Make every recorder take `delay` to finalize
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl RecorderProvider for SimulatedRecorderProvider {
    fn create_recorder(&self, mime_type: &str) -> CaptureResult<Box<dyn MediaRecorder>> {
        let number = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let mut recorder = if self.silent.lock().contains(&number) {
            tracing::debug!("Recorder {} will stay silent", number);
            SimulatedRecorder::silent(mime_type)
        } else {
            SimulatedRecorder::new(mime_type)
        };
        if let Some(delay) = self.stop_delay {
            recorder = recorder.with_stop_delay(delay);
        }
        Ok(Box::new(recorder))
    }
}
