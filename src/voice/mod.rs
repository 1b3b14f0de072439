//! Read-aloud playback for council responses
//!
//! Fetches synthesized audio for final-stage responses, caches it per
//! response, and plays it through exactly one output device:
//! read-aloud button / auto-read → session → fetcher (cache → source) → player → output

pub mod cache;
pub mod download;
pub mod error;
pub mod fetcher;
pub(crate) mod player;
pub mod provider;
pub mod queue;
pub mod session;
pub mod types;


pub use cache::AudioCache;
pub use error::PlaybackError;
pub use fetcher::AudioFetcher;
pub use provider::{AudioOutput, AudioSource, OutputEvent, OutputEvents};
pub use session::PlaybackSession;
pub use types::{AudioPayload, PlayNowOutcome, PlaybackKey, PlaybackState, SessionStatus};
