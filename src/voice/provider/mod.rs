//! Audio source / output boundaries and their implementations.

pub mod mock;
pub mod speak_api;
#[cfg(feature = "speaker")]
pub mod speaker;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::player::{PlayerEvent, PlayerEventKind};
use super::types::{AudioPayload, PlaybackKey};

// ── Source ───────────────────────────────────────────────────────

/// Remote producer of response audio.
///
/// One call is one outbound request; callers decide about caching.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Fetch the audio for one council response.
    async fn fetch(&self, key: &PlaybackKey) -> Result<AudioPayload>;
}

// ── Output ───────────────────────────────────────────────────────

/// Terminal notification from the output device for the loaded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Playback reached the end of the payload.
    Finished,
    /// Playback broke off (decode or device error).
    Failed(String),
}

/// Sink an [`AudioOutput`] uses to report completion of the item it was
/// handed in [`AudioOutput::load`].
///
/// Each handle is bound to one loaded item; notifications for an item that
/// has since been stopped or replaced are dropped by the player.
#[derive(Debug, Clone)]
pub struct OutputEvents {
    ticket: u64,
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl OutputEvents {
    pub(crate) fn new(ticket: u64, tx: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self { ticket, tx }
    }

    pub fn finished(&self) {
        self.send(OutputEvent::Finished);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(OutputEvent::Failed(reason.into()));
    }

    /// Whether both handles refer to the same loaded item.
    pub fn same_item(&self, other: &OutputEvents) -> bool {
        self.ticket == other.ticket && self.tx.same_channel(&other.tx)
    }

    fn send(&self, event: OutputEvent) {
        // The coordinator may already be gone during shutdown.
        let _ = self.tx.send(PlayerEvent {
            ticket: self.ticket,
            kind: PlayerEventKind::Output(event),
        });
    }
}

/// The single audio output device of a session.
///
/// Owned exclusively by the player.  `load` hands over a payload (decode
/// errors surface here), `play` starts it, `stop` silences whatever is
/// loaded.  Natural completion and late errors are reported through the
/// [`OutputEvents`] given to `load`.
pub trait AudioOutput: Send {
    fn load(&mut self, payload: &AudioPayload, events: OutputEvents) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn stop(&mut self);

    /// Human-readable device name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_events_carry_ticket() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = OutputEvents::new(7, tx);

        events.finished();
        events.failed("bad frame");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.ticket, 7);
        assert!(matches!(
            first.kind,
            PlayerEventKind::Output(OutputEvent::Finished)
        ));

        let second = rx.try_recv().unwrap();
        match second.kind {
            PlayerEventKind::Output(OutputEvent::Failed(reason)) => assert_eq!(reason, "bad frame"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn output_events_after_receiver_drop_is_noop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        OutputEvents::new(1, tx).finished();
    }

    #[tokio::test]
    async fn automock_source_counts_calls() {
        let mut source = MockAudioSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(AudioPayload::new(vec![1u8, 2], "audio/mpeg")));

        let payload = source.fetch(&PlaybackKey::new("c", 0)).await.unwrap();
        assert_eq!(payload.len(), 2);
    }
}
