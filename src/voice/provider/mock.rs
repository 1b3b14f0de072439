//! Mock audio source and output device.
//!
//! [`ScriptedAudioSource`] returns deterministic bytes per key with optional
//! latency and scripted failures.  [`MockOutput`] records every call the
//! player makes and lets a test drive completion by hand or on a timer.
//! Both are usable without a backend or a sound card.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::sleep;

use crate::voice::provider::{AudioOutput, AudioSource, OutputEvents};
use crate::voice::types::{AudioPayload, PlaybackKey, DEFAULT_CONTENT_TYPE};

// ── Source ───────────────────────────────────────────────────────

/// Remaining scripted failures for one key.
#[derive(Debug, Clone, Copy)]
enum FailurePlan {
    Times(usize),
    Always,
}

/// Audio source that synthesizes `"audio:<conversation>:<index>"` bytes.
#[derive(Default)]
pub struct ScriptedAudioSource {
    latency: Duration,
    failures: Mutex<HashMap<PlaybackKey, FailurePlan>>,
    calls: Mutex<Vec<PlaybackKey>>,
}

impl ScriptedAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every request for `key` fail.
    pub fn failing(self, key: PlaybackKey) -> Self {
        self.lock_failures().insert(key, FailurePlan::Always);
        self
    }

    /// Make the next `times` requests for `key` fail, then succeed.
    pub fn failing_times(self, key: PlaybackKey, times: usize) -> Self {
        self.lock_failures().insert(key, FailurePlan::Times(times));
        self
    }

    /// Bytes this source returns for `key`.
    pub fn bytes_for(key: &PlaybackKey) -> Vec<u8> {
        format!("audio:{}:{}", key.conversation_id, key.response_index).into_bytes()
    }

    /// Every key requested so far, in request order.
    pub fn calls(&self) -> Vec<PlaybackKey> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of requests made for `key`.
    pub fn call_count(&self, key: &PlaybackKey) -> usize {
        self.calls().iter().filter(|k| *k == key).count()
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<PlaybackKey, FailurePlan>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn should_fail(&self, key: &PlaybackKey) -> bool {
        let mut failures = self.lock_failures();
        match failures.get_mut(key) {
            Some(FailurePlan::Always) => true,
            Some(FailurePlan::Times(0)) | None => false,
            Some(FailurePlan::Times(n)) => {
                *n -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl AudioSource for ScriptedAudioSource {
    async fn fetch(&self, key: &PlaybackKey) -> Result<AudioPayload> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        if self.should_fail(key) {
            bail!("scripted failure for {}", key);
        }

        Ok(AudioPayload::new(Self::bytes_for(key), DEFAULT_CONTENT_TYPE))
    }
}

// ── Output ───────────────────────────────────────────────────────

/// One call made on a [`MockOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    Load(Vec<u8>),
    Play,
    Stop,
}

#[derive(Default)]
struct MockOutputState {
    calls: Vec<OutputCall>,
    current: Option<OutputEvents>,
    playing: bool,
    fail_next_load: Option<String>,
    fail_next_play: Option<String>,
}

/// Recording output device.
///
/// Cloning shares the underlying state, so a test can keep one clone as a
/// remote control while the session owns the other.
#[derive(Clone, Default)]
pub struct MockOutput {
    state: Arc<Mutex<MockOutputState>>,
    auto_finish_after: Option<Duration>,
}

impl MockOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report natural completion `after` each `play` (needs a tokio runtime).
    pub fn auto_finish(mut self, after: Duration) -> Self {
        self.auto_finish_after = Some(after);
        self
    }

    /// Reject the next payload handed to `load`.
    pub fn fail_next_load(&self, reason: impl Into<String>) {
        self.lock().fail_next_load = Some(reason.into());
    }

    /// Reject the next `play` call.
    pub fn fail_next_play(&self, reason: impl Into<String>) {
        self.lock().fail_next_play = Some(reason.into());
    }

    /// Simulate the loaded item reaching its end.
    pub fn finish_current(&self) -> bool {
        match self.take_current() {
            Some(events) => {
                events.finished();
                true
            }
            None => false,
        }
    }

    /// Simulate a decode/device error while playing.
    pub fn fail_current(&self, reason: &str) -> bool {
        match self.take_current() {
            Some(events) => {
                events.failed(reason);
                true
            }
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.lock().calls.clone()
    }

    /// Payloads handed to `load`, in order.
    pub fn loaded(&self) -> Vec<Vec<u8>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                OutputCall::Load(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| **c == OutputCall::Stop)
            .count()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn take_current(&self) -> Option<OutputEvents> {
        let mut state = self.lock();
        state.playing = false;
        state.current.take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockOutputState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioOutput for MockOutput {
    fn load(&mut self, payload: &AudioPayload, events: OutputEvents) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(OutputCall::Load(payload.data.to_vec()));
        state.playing = false;
        if let Some(reason) = state.fail_next_load.take() {
            state.current = None;
            bail!("{}", reason);
        }
        state.current = Some(events);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(OutputCall::Play);
        if let Some(reason) = state.fail_next_play.take() {
            state.current = None;
            bail!("{}", reason);
        }
        let Some(events) = state.current.clone() else {
            bail!("play called with nothing loaded");
        };
        state.playing = true;
        drop(state);

        if let Some(after) = self.auto_finish_after {
            let remote = self.clone();
            tokio::spawn(async move {
                sleep(after).await;
                // Only finish if the same item is still loaded.
                let still_current = {
                    let mut state = remote.lock();
                    let same = state
                        .current
                        .as_ref()
                        .is_some_and(|current| current.same_item(&events));
                    if same {
                        state.current = None;
                        state.playing = false;
                    }
                    same
                };
                if still_current {
                    events.finished();
                }
            });
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.calls.push(OutputCall::Stop);
        state.current = None;
        state.playing = false;
    }

    fn name(&self) -> &str {
        "mock"
    }
}
