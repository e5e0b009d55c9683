//! Screen Rotator - screen capture in rotating segments.
//!
//! Captures a display (plus microphone and remote-peer audio) into one
//! composite stream, records it in fixed-length segments and keeps every
//! finished segment as an artifact. Platform primitives sit behind the
//! traits in [`capture::traits`] and [`recorder::backend`].

pub mod capture;
pub mod config;
pub mod recorder;
pub mod utils;

pub use config::RecorderConfig;
pub use recorder::{Artifact, RecorderEvent, ScreenRecorder};
pub use utils::error::{CaptureError, CaptureResult};
