//! Recording system module
//!
//! This module implements the segment recording architecture:
//! - StreamComposer to merge sources into one composite stream
//! - RecordingSession to turn a composite into one artifact
//! - RotationScheduler to cut recordings into fixed-length segments
//! - ScreenRecorder as the surface for the UI layer

pub mod backend;
pub mod composite;
pub mod coordinator;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod simulated;
pub mod state;
pub mod store;

pub use backend::{ChunkSink, MediaRecorder, RecorderProvider};
pub use composite::{CompositeStream, StreamComposer};
pub use coordinator::{RecorderEvent, ScreenRecorder};
pub use pipeline::CapturePipeline;
pub use scheduler::RotationScheduler;
pub use session::{RecordingActivity, RecordingSession};
pub use state::{Artifact, ArtifactSummary, SessionState};
pub use store::ArtifactStore;
