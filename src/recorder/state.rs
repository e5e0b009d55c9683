//! Recording state management
//!
//! Defines the session state machine and the finalized artifacts it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Current state of a recording session
///
/// ```text
/// idle → recording → stopping → stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, recorder not started
    #[default]
    Idle,
    /// Recorder running, chunks being collected
    Recording,
    /// Waiting for the recorder's final payload
    Stopping,
    /// Terminal
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Immutable finalized recording
///
/// The payload and media type are opaque pass-throughs from the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    id: Uuid,
    index: usize,
    session_id: Uuid,
    media_type: String,
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn new(index: usize, session_id: Uuid, media_type: String, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            session_id,
            media_type,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 1-based position in completion order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// File extension matching the media type (`video/webm;codecs=vp9` → `webm`)
    pub fn file_extension(&self) -> &str {
        let essence = self.media_type.split(';').next().unwrap_or_default().trim();
        match essence.split_once('/') {
            Some((_, subtype)) if !subtype.is_empty() => subtype,
            _ => "bin",
        }
    }

    /// Download name for this artifact
    pub fn file_name(&self) -> String {
        format!("screen-recording-{}.{}", self.index, self.file_extension())
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id,
            index: self.index,
            session_id: self.session_id,
            media_type: self.media_type.clone(),
            size_bytes: self.payload.len(),
            file_name: self.file_name(),
            created_at_ms: self.created_at.timestamp_millis(),
        }
    }
}

/// Payload-free description of an artifact for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub index: usize,
    pub session_id: Uuid,
    pub media_type: String,
    pub size_bytes: usize,
    pub file_name: String,
    pub created_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        let artifact = Artifact::new(1, Uuid::new_v4(), "video/webm".into(), vec![1]);
        assert_eq!(artifact.file_extension(), "webm");
        assert_eq!(artifact.file_name(), "screen-recording-1.webm");

        let artifact = Artifact::new(2, Uuid::new_v4(), "video/mp4;codecs=avc1".into(), vec![1]);
        assert_eq!(artifact.file_extension(), "mp4");

        let artifact = Artifact::new(3, Uuid::new_v4(), "garbage".into(), vec![1]);
        assert_eq!(artifact.file_extension(), "bin");
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let artifact = Artifact::new(4, Uuid::new_v4(), "video/webm".into(), vec![0; 16]);
        let json = serde_json::to_value(artifact.summary()).unwrap();

        assert_eq!(json["index"], 4);
        assert_eq!(json["sizeBytes"], 16);
        assert_eq!(json["mediaType"], "video/webm");
        assert_eq!(json["fileName"], "screen-recording-4.webm");
    }

    #[test]
    fn test_session_state_serialization() {
        assert_eq!(serde_json::to_string(&SessionState::Stopping).unwrap(), r#""stopping""#);
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
