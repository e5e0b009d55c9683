//! Recorder primitive
//!
//! Defines the interface to the platform encoder that turns a composite
//! stream into binary chunks.

use super::composite::CompositeStream;
use crate::utils::error::CaptureResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delivery end for encoded chunks
///
/// Chunks are delivered in the order they are emitted.
#[derive(Clone)]
pub struct ChunkSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChunkSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand one chunk to the session.
    ///
    /// Returns `false` once the session has stopped listening.
    pub fn emit(&self, chunk: Vec<u8>) -> bool {
        self.tx.send(chunk).is_ok()
    }
}

/// Platform recorder for one session
#[async_trait]
pub trait MediaRecorder: Send {
    /// Start encoding `stream`, emitting a chunk to `sink` every `timeslice`
    async fn start(
        &mut self,
        stream: CompositeStream,
        timeslice: Duration,
        sink: ChunkSink,
    ) -> CaptureResult<()>;

    /// Stop encoding.
    ///
    /// The final payload must be emitted before this returns. Chunks emitted
    /// afterwards are discarded.
    async fn stop(&mut self) -> CaptureResult<()>;
}

/// Creates a fresh recorder for every session
pub trait RecorderProvider: Send + Sync {
    fn create_recorder(&self, mime_type: &str) -> CaptureResult<Box<dyn MediaRecorder>>;
}
