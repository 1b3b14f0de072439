//! Process-wide playback session.
//!
//! [`PlaybackSession`] is a cheap, cloneable handle.  The state lives in a
//! coordinator task that owns the player (and through it the output
//! device) together with the auto-read queue.  Public calls and player
//! events are both delivered to that task as messages and handled one at a
//! time, so every transition is applied against a consistent view of the
//! player and the queue.
//!
//! Priority rules:
//! - `play_now` preempts: stops current audio, discards the queue, loads
//!   the new key.  Failures are returned to the caller.
//! - `enqueue` appends; it starts playback only when the player is idle.
//!   Failures of queued items are logged and the queue moves on.
//! - `stop` halts everything and empties the queue.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashSet;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::Config;

use super::download;
use super::error::PlaybackError;
use super::fetcher::AudioFetcher;
use super::player::{Origin, PendingReply, Player, PlayerEvent, Terminal};
use super::provider::AudioOutput;
use super::provider::speak_api::SpeakApiSource;
use super::queue::PlaybackQueue;
use super::types::{AudioPayload, PlayNowOutcome, PlaybackKey, PlaybackState, SessionStatus};

/// Requests from handles to the coordinator task.
enum Command {
    Enqueue {
        key: PlaybackKey,
        done: oneshot::Sender<()>,
    },
    PlayNow {
        key: PlaybackKey,
        reply: oneshot::Sender<Result<PlayNowOutcome, PlaybackError>>,
    },
    Stop {
        done: oneshot::Sender<()>,
    },
}

/// Auto-read toggle and the set of responses already auto-read.
#[derive(Default)]
struct AutoRead {
    enabled: AtomicBool,
    triggered: DashSet<PlaybackKey>,
}

/// Handle to the playback coordinator.
#[derive(Clone)]
pub struct PlaybackSession {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    fetcher: Arc<AudioFetcher>,
    auto_read: Arc<AutoRead>,
}

impl PlaybackSession {
    /// Start the coordinator task.  Must be called within a tokio runtime.
    ///
    /// The task runs until every handle has been dropped.
    pub fn spawn(fetcher: AudioFetcher, output: Box<dyn AudioOutput>) -> Self {
        let fetcher = Arc::new(fetcher);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let player = Player::new(output, Arc::clone(&fetcher), event_tx);
        info!(output = player.output_name(), "Playback session started");

        let coordinator = Coordinator {
            player,
            queue: PlaybackQueue::new(),
            status: status_tx,
            replies: Vec::new(),
        };
        tokio::spawn(coordinator.run(command_rx, event_rx));

        Self {
            commands: command_tx,
            status: status_rx,
            fetcher,
            auto_read: Arc::new(AutoRead::default()),
        }
    }

    /// Session backed by the council speak endpoint described in `config`.
    pub fn from_config(config: &Config, output: Box<dyn AudioOutput>) -> Result<Self> {
        let source = SpeakApiSource::new(config.api.clone())?;
        let fetcher = AudioFetcher::new(Arc::new(source)).with_timeout(config.api.timeout()?);
        Ok(Self::spawn(fetcher, output).with_auto_read(config.playback.auto_read))
    }

    /// Set the initial auto-read toggle.
    pub fn with_auto_read(self, enabled: bool) -> Self {
        self.set_auto_read(enabled);
        self
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Queue `key` for auto-read.  Starts immediately if nothing is playing.
    ///
    /// Resolves once the coordinator has taken the request, not when the
    /// audio has played.
    pub async fn enqueue(&self, key: PlaybackKey) -> Result<(), PlaybackError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Enqueue { key, done })?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    /// Read `key` aloud now, replacing anything playing or queued.
    ///
    /// Resolves with `Started` once audio is playing, with an error if the
    /// fetch or the device failed, or with `Cancelled` if another manual
    /// request or a stop came first.
    pub async fn play_now(&self, key: PlaybackKey) -> Result<PlayNowOutcome, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PlayNow { key, reply })?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)?
    }

    /// Stop playback and discard the queue.
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Stop { done })?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    // ── Observation ──────────────────────────────────────────────

    /// Whether `key` is loading, playing, or neither.
    pub fn playback_state_for(&self, key: &PlaybackKey) -> PlaybackState {
        self.status.borrow().state_for(key)
    }

    /// Latest published snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until nothing is loading, playing or queued.
    pub async fn wait_until_idle(&self) -> Result<(), PlaybackError> {
        let mut rx = self.subscribe();
        rx.wait_for(SessionStatus::is_idle)
            .await
            .map(|_| ())
            .map_err(|_| PlaybackError::SessionClosed)
    }

    // ── Download ─────────────────────────────────────────────────

    /// Cached or freshly fetched audio for `key`; never touches playback.
    pub async fn download_audio_for(&self, key: &PlaybackKey) -> Result<AudioPayload, PlaybackError> {
        self.fetcher.fetch(key).await
    }

    /// Write the audio for `key` into `dir` and return the file path.
    pub async fn save_audio_for(&self, key: &PlaybackKey, dir: &Path) -> Result<PathBuf> {
        let payload = self.download_audio_for(key).await?;
        download::save_payload(key, &payload, dir).await
    }

    /// Number of responses with cached audio.
    pub fn cached_responses(&self) -> usize {
        self.fetcher.cache().entry_count()
    }

    // ── Auto-read ────────────────────────────────────────────────

    pub fn auto_read_enabled(&self) -> bool {
        self.auto_read.enabled.load(Ordering::Acquire)
    }

    pub fn set_auto_read(&self, enabled: bool) {
        self.auto_read.enabled.store(enabled, Ordering::Release);
        info!(enabled, "Auto-read toggled");
    }

    /// Flip auto-read and return the new value.
    pub fn toggle_auto_read(&self) -> bool {
        let enabled = !self.auto_read.enabled.fetch_xor(true, Ordering::AcqRel);
        info!(enabled, "Auto-read toggled");
        enabled
    }

    /// Auto-read trigger for a freshly rendered final response.
    ///
    /// Enqueues `key` at most once per session and only while auto-read is
    /// on.  Returns whether it was enqueued.
    pub async fn response_rendered(&self, key: PlaybackKey) -> Result<bool, PlaybackError> {
        if !self.auto_read_enabled() {
            return Ok(false);
        }
        if !self.auto_read.triggered.insert(key.clone()) {
            debug!(key = %key, "Response already auto-read");
            return Ok(false);
        }
        self.enqueue(key).await?;
        Ok(true)
    }

    fn send(&self, command: Command) -> Result<(), PlaybackError> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::SessionClosed)
    }
}

// ── Coordinator ──────────────────────────────────────────────────

struct Coordinator {
    player: Player,
    queue: PlaybackQueue,
    status: watch::Sender<SessionStatus>,
    /// Manual replies waiting for the next publish.
    replies: Vec<PendingReply>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<PlayerEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.halt_current();
        self.queue.clear();
        self.settle();
        info!("Playback session closed");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { key, done } => {
                self.queue.push(key);
                if self.player.is_idle() {
                    self.advance();
                }
                self.settle();
                let _ = done.send(());
            }
            Command::PlayNow { key, reply } => {
                self.preempt(&key);
                self.player.dispatch(key, Origin::Manual(Some(reply)));
                self.settle();
            }
            Command::Stop { done } => {
                let halted = self.halt_current();
                let dropped = self.queue.clear();
                info!(halted, dropped, "Playback stopped");
                self.settle();
                let _ = done.send(());
            }
        }
    }

    fn handle_event(&mut self, event: PlayerEvent) {
        if let Some(terminal) = self.player.handle(event) {
            self.report(terminal);
            self.advance();
        }
        self.settle();
    }

    /// Clear the way for a manual request.
    fn preempt(&mut self, key: &PlaybackKey) {
        let halted = self.halt_current();
        let dropped = self.queue.clear();
        if halted || dropped > 0 {
            info!(key = %key, halted, dropped, "Manual playback preempts current audio");
        }
    }

    /// Halt the player and answer an interrupted manual request.
    fn halt_current(&mut self) -> bool {
        match self.player.halt() {
            Some(mut activity) => {
                self.replies
                    .extend(activity.origin.answer(Ok(PlayNowOutcome::Cancelled)));
                true
            }
            None => false,
        }
    }

    /// Surface manual failures, swallow queued ones.
    fn report(&mut self, terminal: Terminal) {
        let Terminal {
            mut activity,
            error,
        } = terminal;
        let Some(error) = error else {
            return;
        };
        match activity.origin.answer(Err(error.clone())) {
            Some(reply) => self.replies.push(reply),
            None if activity.origin.is_manual() => {
                warn!(key = %activity.key, error = %error, "Manual playback ended with error");
            }
            None => warn!(key = %activity.key, error = %error, "Skipping failed auto-read item"),
        }
    }

    /// Start the next queued item if the player is free.
    fn advance(&mut self) {
        if !self.player.is_idle() {
            return;
        }
        match self.queue.pop() {
            Some(next) => self.player.dispatch(next, Origin::Queued),
            None => debug!("Queue empty, player idle"),
        }
    }

    /// Publish the new status, then release the replies it answers.
    ///
    /// A caller woken by its reply must already observe the state the
    /// reply describes.
    fn settle(&mut self) {
        self.publish();
        let replies = self.player.take_replies();
        for reply in replies.into_iter().chain(self.replies.drain(..)) {
            if !reply.send() {
                debug!("Manual caller stopped waiting");
            }
        }
    }

    fn publish(&self) {
        let (state, current) = self.player.current();
        let status = SessionStatus {
            state,
            current: current.cloned(),
            queued: self.queue.snapshot(),
        };
        self.status.send_if_modified(|old| {
            if *old == status {
                false
            } else {
                *old = status;
                true
            }
        });
    }
}
