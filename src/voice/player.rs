//! Player state machine.
//!
//! ```text
//!            dispatch                fetched + load + play ok
//!   Idle ─────────────▶ Loading(key) ─────────────────────────▶ Playing(key)
//!    ▲                     │  fetch / load / play failed           │
//!    │                     ▼                                       │ finished,
//!    └──────────────────  Idle  ◀──────────────────────────────────┘ failed,
//!                                                                    halt
//! ```
//!
//! The player owns the one output device and is the only component that
//! touches it.  Every activity gets a fresh ticket; fetch completions and
//! output notifications carry the ticket they were issued for, and anything
//! not matching the current activity is discarded.  That is what keeps at
//! most one key loading or playing no matter how completions interleave.
//!
//! The player never looks at the queue.  Terminal transitions are returned
//! to the caller as a [`Terminal`] so the coordinator can advance.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::PlaybackError;
use super::fetcher::AudioFetcher;
use super::provider::{AudioOutput, OutputEvent, OutputEvents};
use super::types::{AudioPayload, PlayNowOutcome, PlaybackKey, PlaybackState};

/// Reply channel of a manual request, answered once playback starts or fails.
pub(crate) type ManualReply = oneshot::Sender<Result<PlayNowOutcome, PlaybackError>>;

/// Message delivered to the player through its event channel.
#[derive(Debug)]
pub(crate) struct PlayerEvent {
    pub ticket: u64,
    pub kind: PlayerEventKind,
}

#[derive(Debug)]
pub(crate) enum PlayerEventKind {
    /// The fetch started by `dispatch` completed.
    Fetched(Result<AudioPayload, PlaybackError>),
    /// The output device reported on the loaded item.
    Output(OutputEvent),
}

/// Where a playback request came from.
#[derive(Debug)]
pub(crate) enum Origin {
    /// Read-aloud button.  The reply is taken once it has been answered.
    Manual(Option<ManualReply>),
    /// Auto-read queue.
    Queued,
}

impl Origin {
    pub fn is_manual(&self) -> bool {
        matches!(self, Origin::Manual(_))
    }

    /// Take the pending manual reply, if any, paired with its answer.
    pub fn answer(&mut self, result: Result<PlayNowOutcome, PlaybackError>) -> Option<PendingReply> {
        match self {
            Origin::Manual(reply) => reply.take().map(|reply| PendingReply { reply, result }),
            Origin::Queued => None,
        }
    }
}

/// Answer to a manual request, held until the coordinator has published
/// the status that the answer describes.
#[derive(Debug)]
pub(crate) struct PendingReply {
    reply: ManualReply,
    result: Result<PlayNowOutcome, PlaybackError>,
}

impl PendingReply {
    /// Returns false if the caller stopped waiting.
    pub fn send(self) -> bool {
        self.reply.send(self.result).is_ok()
    }
}

/// The activity the player is busy with.
#[derive(Debug)]
pub(crate) struct Activity {
    pub key: PlaybackKey,
    pub ticket: u64,
    pub origin: Origin,
}

#[derive(Debug)]
enum PlayerState {
    Idle,
    Loading {
        activity: Activity,
        cancel: CancellationToken,
    },
    Playing {
        activity: Activity,
    },
}

/// A return to `Idle` caused by the activity itself (not by `halt`).
#[derive(Debug)]
pub(crate) struct Terminal {
    pub activity: Activity,
    /// `None` on natural completion.
    pub error: Option<PlaybackError>,
}

pub(crate) struct Player {
    output: Box<dyn AudioOutput>,
    fetcher: Arc<AudioFetcher>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    state: PlayerState,
    last_ticket: u64,
    replies: Vec<PendingReply>,
}

impl Player {
    pub fn new(
        output: Box<dyn AudioOutput>,
        fetcher: Arc<AudioFetcher>,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            output,
            fetcher,
            events,
            state: PlayerState::Idle,
            last_ticket: 0,
            replies: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, PlayerState::Idle)
    }

    /// Overall state and the key it applies to.
    pub fn current(&self) -> (PlaybackState, Option<&PlaybackKey>) {
        match &self.state {
            PlayerState::Idle => (PlaybackState::Idle, None),
            PlayerState::Loading { activity, .. } => (PlaybackState::Loading, Some(&activity.key)),
            PlayerState::Playing { activity } => (PlaybackState::Playing, Some(&activity.key)),
        }
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }

    /// Manual replies produced since the last call.
    pub fn take_replies(&mut self) -> Vec<PendingReply> {
        std::mem::take(&mut self.replies)
    }

    /// `Idle → Loading(key)`: start fetching `key` in the background.
    ///
    /// Callers halt the current activity first; dispatching while busy
    /// halts it here as a last resort so the invariant holds regardless.
    pub fn dispatch(&mut self, key: PlaybackKey, origin: Origin) {
        if let Some(mut previous) = self.halt() {
            warn!(key = %previous.key, "Dispatch while busy, halting previous activity");
            self.replies
                .extend(previous.origin.answer(Ok(PlayNowOutcome::Cancelled)));
        }

        self.last_ticket += 1;
        let ticket = self.last_ticket;
        let cancel = CancellationToken::new();

        info!(key = %key, ticket, manual = origin.is_manual(), "Loading audio");

        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let fetch_key = key.clone();
        let fetch_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = fetch_cancel.cancelled() => {
                    debug!(key = %fetch_key, ticket, "Fetch cancelled");
                }
                result = fetcher.fetch(&fetch_key) => {
                    let _ = events.send(PlayerEvent {
                        ticket,
                        kind: PlayerEventKind::Fetched(result),
                    });
                }
            }
        });

        self.state = PlayerState::Loading {
            activity: Activity {
                key,
                ticket,
                origin,
            },
            cancel,
        };
    }

    /// Cancel whatever is loading or playing and return to `Idle`.
    ///
    /// Returns the interrupted activity so the caller can answer it.
    pub fn halt(&mut self) -> Option<Activity> {
        match std::mem::replace(&mut self.state, PlayerState::Idle) {
            PlayerState::Idle => None,
            PlayerState::Loading { activity, cancel } => {
                cancel.cancel();
                debug!(key = %activity.key, ticket = activity.ticket, "Halted while loading");
                Some(activity)
            }
            PlayerState::Playing { activity } => {
                self.output.stop();
                debug!(key = %activity.key, ticket = activity.ticket, "Halted while playing");
                Some(activity)
            }
        }
    }

    /// Apply one event.  Returns `Some` when the activity ended on its own.
    pub fn handle(&mut self, event: PlayerEvent) -> Option<Terminal> {
        let current = match &self.state {
            PlayerState::Idle => None,
            PlayerState::Loading { activity, .. } | PlayerState::Playing { activity } => {
                Some(activity.ticket)
            }
        };
        if current != Some(event.ticket) {
            debug!(ticket = event.ticket, ?current, "Ignoring stale player event");
            return None;
        }

        let state = std::mem::replace(&mut self.state, PlayerState::Idle);
        match (state, event.kind) {
            (PlayerState::Loading { activity, .. }, PlayerEventKind::Fetched(Ok(payload))) => {
                self.start(activity, payload)
            }
            (PlayerState::Loading { activity, .. }, PlayerEventKind::Fetched(Err(error))) => {
                Some(Terminal {
                    activity,
                    error: Some(error),
                })
            }
            (PlayerState::Playing { activity }, PlayerEventKind::Output(OutputEvent::Finished)) => {
                info!(key = %activity.key, "Playback finished");
                Some(Terminal {
                    activity,
                    error: None,
                })
            }
            (
                PlayerState::Playing { activity },
                PlayerEventKind::Output(OutputEvent::Failed(reason)),
            ) => {
                let error = PlaybackError::playback(&activity.key, reason);
                Some(Terminal {
                    activity,
                    error: Some(error),
                })
            }
            (state, kind) => {
                warn!(?kind, "Player event does not apply to current state");
                self.state = state;
                None
            }
        }
    }

    /// `Loading → Playing`, or straight back to `Idle` if the device refuses.
    fn start(&mut self, mut activity: Activity, payload: AudioPayload) -> Option<Terminal> {
        let events = OutputEvents::new(activity.ticket, self.events.clone());
        let started = self
            .output
            .load(&payload, events)
            .and_then(|()| self.output.play());

        match started {
            Ok(()) => {
                info!(
                    key = %activity.key,
                    bytes = payload.len(),
                    output = self.output.name(),
                    "Playback started"
                );
                self.replies
                    .extend(activity.origin.answer(Ok(PlayNowOutcome::Started)));
                self.state = PlayerState::Playing { activity };
                None
            }
            Err(e) => {
                self.output.stop();
                let error = PlaybackError::playback(&activity.key, format!("{:#}", e));
                Some(Terminal {
                    activity,
                    error: Some(error),
                })
            }
        }
    }
}
