//! Error types surfaced by the playback coordinator.

use thiserror::Error;

use super::types::PlaybackKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The remote call for the audio failed (transport, status, timeout, empty body).
    #[error("failed to fetch audio for {key}: {reason}")]
    Fetch { key: PlaybackKey, reason: String },

    /// The output device could not load or play the payload.
    #[error("failed to play audio for {key}: {reason}")]
    Playback { key: PlaybackKey, reason: String },

    /// The coordinator task is no longer running.
    #[error("playback session is closed")]
    SessionClosed,
}

impl PlaybackError {
    pub fn fetch(key: &PlaybackKey, reason: impl Into<String>) -> Self {
        Self::Fetch {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    pub fn playback(key: &PlaybackKey, reason: impl Into<String>) -> Self {
        Self::Playback {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Key the failure belongs to, if any.
    pub fn key(&self) -> Option<&PlaybackKey> {
        match self {
            Self::Fetch { key, .. } | Self::Playback { key, .. } => Some(key),
            Self::SessionClosed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_key() {
        let key = PlaybackKey::new("conv", 1);
        let err = PlaybackError::fetch(&key, "HTTP 500");
        assert_eq!(err.to_string(), "failed to fetch audio for conv#1: HTTP 500");
        assert_eq!(err.key(), Some(&key));

        let err = PlaybackError::playback(&key, "decode error");
        assert!(err.to_string().contains("decode error"));
        assert!(PlaybackError::SessionClosed.key().is_none());
    }
}
