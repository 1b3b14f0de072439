//! Cache-first audio fetcher.
//!
//! Turns a [`PlaybackKey`] into bytes: a cache hit returns immediately,
//! a miss issues exactly one request to the [`AudioSource`] and stores a
//! successful result before returning it.  Failures are not cached, so a
//! later call retries.  Concurrent misses for the same key are independent
//! requests that converge on the first stored payload.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::cache::AudioCache;
use super::error::PlaybackError;
use super::provider::AudioSource;
use super::types::{AudioPayload, PlaybackKey};

pub struct AudioFetcher {
    cache: AudioCache,
    source: Arc<dyn AudioSource>,
    timeout: Option<Duration>,
}

impl AudioFetcher {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            cache: AudioCache::new(),
            source,
            timeout: None,
        }
    }

    /// Treat requests that take longer than `timeout` as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// Return the audio for `key`, from cache when possible.
    pub async fn fetch(&self, key: &PlaybackKey) -> Result<AudioPayload, PlaybackError> {
        if let Some(payload) = self.cache.lookup(key) {
            return Ok(payload);
        }

        debug!(key = %key, "Fetching audio from source");

        let request = self.source.fetch(key);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(key = %key, timeout_ms = limit.as_millis() as u64, "Audio fetch timed out");
                    return Err(PlaybackError::fetch(
                        key,
                        format!("timed out after {:?}", limit),
                    ));
                }
            },
            None => request.await,
        };

        match result {
            Ok(payload) if payload.is_empty() => {
                warn!(key = %key, "Audio source returned an empty payload");
                Err(PlaybackError::fetch(key, "empty audio payload"))
            }
            Ok(payload) => Ok(self.cache.insert(key.clone(), payload)),
            Err(e) => {
                warn!(key = %key, error = %e, "Audio fetch failed");
                Err(PlaybackError::fetch(key, format!("{:#}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::provider::MockAudioSource;

    fn payload(bytes: &[u8]) -> AudioPayload {
        AudioPayload::new(bytes.to_vec(), "audio/mpeg")
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let mut source = MockAudioSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(payload(&[1, 2, 3])));
        let fetcher = AudioFetcher::new(Arc::new(source));
        let key = PlaybackKey::new("c", 0);

        let first = fetcher.fetch(&key).await.unwrap();
        let second = fetcher.fetch(&key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(&*second.data, &[1, 2, 3]);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let mut source = MockAudioSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("HTTP 500")));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(payload(&[4, 5])));
        let fetcher = AudioFetcher::new(Arc::new(source));
        let key = PlaybackKey::new("c", 1);

        let err = fetcher.fetch(&key).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Fetch { .. }));
        assert!(!fetcher.cache().contains(&key));

        let ok = fetcher.fetch(&key).await.unwrap();
        assert_eq!(&*ok.data, &[4, 5]);
        assert!(fetcher.cache().contains(&key));
    }

    #[tokio::test]
    async fn empty_payload_is_a_failure() {
        let mut source = MockAudioSource::new();
        source
            .expect_fetch()
            .returning(|_| Ok(AudioPayload::new(Vec::<u8>::new(), "audio/mpeg")));
        let fetcher = AudioFetcher::new(Arc::new(source));
        let key = PlaybackKey::new("c", 0);

        assert!(fetcher.fetch(&key).await.is_err());
        assert_eq!(fetcher.cache().entry_count(), 0);
    }

    #[tokio::test]
    async fn different_keys_fetch_separately() {
        let mut source = MockAudioSource::new();
        source
            .expect_fetch()
            .times(2)
            .returning(|key| Ok(payload(&[key.response_index as u8])));
        let fetcher = AudioFetcher::new(Arc::new(source));

        let a = fetcher.fetch(&PlaybackKey::new("c", 0)).await.unwrap();
        let b = fetcher.fetch(&PlaybackKey::new("c", 1)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(fetcher.cache().entry_count(), 2);
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        use crate::voice::provider::mock::ScriptedAudioSource;

        let source = ScriptedAudioSource::new().with_latency(Duration::from_millis(200));
        let fetcher = AudioFetcher::new(Arc::new(source))
            .with_timeout(Some(Duration::from_millis(20)));
        let key = PlaybackKey::new("c", 0);

        let err = fetcher.fetch(&key).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(!fetcher.cache().contains(&key));
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let fetcher = AudioFetcher::new(Arc::new(MockAudioSource::new()))
            .with_timeout(Some(Duration::ZERO));
        assert!(fetcher.timeout.is_none());
    }
}
