//! Shared utilities

pub mod error;

pub use error::{CaptureError, CaptureResult, ErrorResponse};
