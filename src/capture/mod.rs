//! Media capture
//!
//! Tracks, sources, the platform capture primitives, and the acquirer that
//! turns primitive grants into validated sources.

pub mod acquirer;
pub mod simulated;
pub mod source;
pub mod track;
pub mod traits;

pub use acquirer::{CaptureMode, SourceAcquirer};
pub use source::{MediaSource, SourceKind, SourceStatus};
pub use track::{MediaTrack, TrackKind, TrackState};
pub use traits::{
    AudioConstraints, CursorVisibility, DisplayCapture, DisplayConstraints, DisplayGrant,
    DisplaySurface, DisplayTarget, MicrophoneCapture, PeerConnection, RemoteTrackEvent,
};
