//! Council backend speech endpoint.
//!
//! `POST {base_url}/api/conversations/{id}/speak` with
//! `{"voice_id": "...", "message_index": N}`; the response body is the
//! synthesized audio of the final-stage answer (MP3 by default).
//!
//! One request per call.  Retrying is left to whoever calls again later.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::debug;

use crate::config::ApiConfig;
use crate::voice::provider::AudioSource;
use crate::voice::types::{AudioPayload, DEFAULT_CONTENT_TYPE, PlaybackKey};

/// Longest error body quoted in a failure message.
const MAX_ERROR_BODY_BYTES: usize = 200;

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    voice_id: &'a str,
    message_index: usize,
}

/// [`AudioSource`] backed by the council HTTP API.
pub struct SpeakApiSource {
    config: ApiConfig,
    client: reqwest::Client,
}

impl SpeakApiSource {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn speak_url(&self, key: &PlaybackKey) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let id = utf8_percent_encode(&key.conversation_id, NON_ALPHANUMERIC);
        format!("{}/api/conversations/{}/speak", base, id)
    }

    fn request_body<'a>(&'a self, key: &PlaybackKey) -> SpeakRequest<'a> {
        SpeakRequest {
            voice_id: &self.config.voice_id,
            message_index: key.response_index,
        }
    }
}

#[async_trait]
impl AudioSource for SpeakApiSource {
    async fn fetch(&self, key: &PlaybackKey) -> Result<AudioPayload> {
        let url = self.speak_url(key);
        debug!(url = %url, voice = %self.config.voice_id, "Requesting speech");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(key))
            .send()
            .await
            .context("speak request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "speak endpoint returned {}: {}",
                status,
                truncate_at_char_boundary(body.trim(), MAX_ERROR_BODY_BYTES)
            );
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .context("failed to read speak response body")?;
        if bytes.is_empty() {
            bail!("speak endpoint returned an empty body");
        }

        debug!(bytes = bytes.len(), content_type = %content_type, "Speech received");
        Ok(AudioPayload::new(bytes.to_vec(), content_type))
    }
}

/// Cut `s` to at most `max_bytes` without splitting a character.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
