//! Core value types shared by the playback coordinator.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Content type assumed when the backend does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Identifies one speakable council response.
///
/// `response_index` is the zero-based position among the assistant
/// responses of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackKey {
    pub conversation_id: String,
    pub response_index: usize,
}

impl PlaybackKey {
    pub fn new(conversation_id: impl Into<String>, response_index: usize) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            response_index,
        }
    }
}

impl fmt::Display for PlaybackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.conversation_id, self.response_index)
    }
}

/// Opaque audio blob as returned by the backend.
///
/// The bytes are reference counted so cache hits, downloads and the
/// output device all share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub data: Arc<[u8]>,
    pub content_type: String,
}

impl AudioPayload {
    pub fn new(data: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the content type, used when saving to disk.
    pub fn file_extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/ogg" | "audio/vorbis" => "ogg",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            _ => "bin",
        }
    }
}

/// Player state as seen from one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
}

/// Snapshot of the session published after every coordinator step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// State of the player as a whole.
    pub state: PlaybackState,
    /// Key currently loading or playing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<PlaybackKey>,
    /// Pending auto-read items in playback order.
    pub queued: Vec<PlaybackKey>,
}

impl SessionStatus {
    /// State of `key`: `Loading`/`Playing` only for the current key.
    pub fn state_for(&self, key: &PlaybackKey) -> PlaybackState {
        match &self.current {
            Some(current) if current == key => self.state,
            _ => PlaybackState::Idle,
        }
    }

    /// Nothing loading, nothing playing, nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.state == PlaybackState::Idle && self.queued.is_empty()
    }
}

/// Result of a manual read-aloud request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayNowOutcome {
    /// Audio reached the output device and is playing.
    Started,
    /// A later manual request or a stop replaced this one before it started.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_equality_uses_both_fields() {
        assert_eq!(PlaybackKey::new("c1", 0), PlaybackKey::new("c1", 0));
        assert_ne!(PlaybackKey::new("c1", 0), PlaybackKey::new("c1", 1));
        assert_ne!(PlaybackKey::new("c1", 0), PlaybackKey::new("c2", 0));
    }

    #[test]
    fn key_display() {
        assert_eq!(PlaybackKey::new("abc", 3).to_string(), "abc#3");
    }

    #[test]
    fn file_extension_from_content_type() {
        let ext = |ct: &str| AudioPayload::new(vec![1u8], ct).file_extension();
        assert_eq!(ext("audio/mpeg"), "mp3");
        assert_eq!(ext("Audio/MPEG; charset=binary"), "mp3");
        assert_eq!(ext("audio/ogg"), "ogg");
        assert_eq!(ext("audio/x-wav"), "wav");
        assert_eq!(ext("application/octet-stream"), "bin");
    }

    #[test]
    fn status_state_for_only_reports_current_key() {
        let a = PlaybackKey::new("c", 0);
        let b = PlaybackKey::new("c", 1);
        let status = SessionStatus {
            state: PlaybackState::Playing,
            current: Some(a.clone()),
            queued: vec![b.clone()],
        };
        assert_eq!(status.state_for(&a), PlaybackState::Playing);
        assert_eq!(status.state_for(&b), PlaybackState::Idle);
        assert!(!status.is_idle());
    }

    #[test]
    fn default_status_is_idle() {
        let status = SessionStatus::default();
        assert!(status.is_idle());
        assert!(status.current.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let status = SessionStatus {
            state: PlaybackState::Loading,
            current: Some(PlaybackKey::new("c", 2)),
            queued: Vec::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "loading");
        assert_eq!(json["current"]["response_index"], 2);
    }
}
