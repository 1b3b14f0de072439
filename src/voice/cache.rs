//! In-memory audio cache keyed by [`PlaybackKey`].
//!
//! Entries are immutable once inserted and never evicted; the cache lives
//! as long as the session.  Payloads are small MP3 clips and sessions are
//! short, so unbounded growth is an accepted tradeoff.  When two fetches for
//! the same key race, the first insert wins and both callers get the stored
//! payload, so replays of a response are always byte-identical.

use dashmap::DashMap;
use tracing::debug;

use super::types::{AudioPayload, PlaybackKey};

/// Append-only concurrent map from response key to fetched audio.
#[derive(Default)]
pub struct AudioCache {
    entries: DashMap<PlaybackKey, AudioPayload>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached payload.
    pub fn lookup(&self, key: &PlaybackKey) -> Option<AudioPayload> {
        match self.entries.get(key) {
            Some(entry) => {
                debug!(key = %key, "Audio cache hit");
                Some(entry.value().clone())
            }
            None => {
                debug!(key = %key, "Audio cache miss");
                None
            }
        }
    }

    /// Insert a payload unless one is already stored for `key`.
    ///
    /// Returns the payload that is in the cache afterwards.
    pub fn insert(&self, key: PlaybackKey, payload: AudioPayload) -> AudioPayload {
        let mut inserted = false;
        let entry = self.entries.entry(key).or_insert_with(|| {
            inserted = true;
            payload
        });
        if inserted {
            debug!(key = %entry.key(), bytes = entry.value().len(), "Audio cache insert");
        } else {
            debug!(key = %entry.key(), "Audio cache already populated, keeping first payload");
        }
        entry.value().clone()
    }

    pub fn contains(&self, key: &PlaybackKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached responses.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Total size of cached audio in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(bytes: &[u8]) -> AudioPayload {
        AudioPayload::new(bytes.to_vec(), "audio/mpeg")
    }

    #[test]
    fn miss_then_hit() {
        let cache = AudioCache::new();
        let key = PlaybackKey::new("c", 0);

        assert!(cache.lookup(&key).is_none());
        cache.insert(key.clone(), payload(&[1, 2, 3]));

        let hit = cache.lookup(&key).unwrap();
        assert_eq!(&*hit.data, &[1, 2, 3]);
        assert_eq!(hit.content_type, "audio/mpeg");
        assert!(cache.contains(&key));
    }

    #[test]
    fn first_insert_wins() {
        let cache = AudioCache::new();
        let key = PlaybackKey::new("c", 0);

        let first = cache.insert(key.clone(), payload(&[1, 2, 3]));
        let second = cache.insert(key.clone(), payload(&[9, 9]));

        assert_eq!(first, second);
        assert_eq!(&*cache.lookup(&key).unwrap().data, &[1, 2, 3]);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn keys_are_per_conversation_and_index() {
        let cache = AudioCache::new();
        cache.insert(PlaybackKey::new("a", 0), payload(&[0; 10]));
        cache.insert(PlaybackKey::new("a", 1), payload(&[0; 20]));
        cache.insert(PlaybackKey::new("b", 0), payload(&[0; 30]));

        assert_eq!(cache.entry_count(), 3);
        assert_eq!(cache.total_size_bytes(), 60);
        assert!(!cache.contains(&PlaybackKey::new("b", 1)));
    }

    #[test]
    fn hits_share_the_same_allocation() {
        let cache = AudioCache::new();
        let key = PlaybackKey::new("c", 0);
        cache.insert(key.clone(), payload(&[7; 64]));

        let a = cache.lookup(&key).unwrap();
        let b = cache.lookup(&key).unwrap();
        assert!(std::sync::Arc::ptr_eq(&a.data, &b.data));
    }
}
