//! Default output device via rodio.
//!
//! rodio's `OutputStream` is not `Send`, so the stream lives on a dedicated
//! audio thread and [`SpeakerOutput`] talks to it over a channel.  Payloads
//! are decoded on the caller's side in `load`, so malformed audio is
//! reported before anything is played.

use std::io::Cursor;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, error, info};

use crate::voice::provider::{AudioOutput, OutputEvents};
use crate::voice::types::AudioPayload;

/// How often the audio thread checks whether the sink has drained.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Source = Decoder<Cursor<Vec<u8>>>;

enum SpeakerCommand {
    Play {
        source: Source,
        events: OutputEvents,
        done: mpsc::Sender<Result<()>>,
    },
    Stop,
}

/// Plays payloads on the system's default output device.
pub struct SpeakerOutput {
    commands: mpsc::Sender<SpeakerCommand>,
    pending: Option<(Source, OutputEvents)>,
}

impl SpeakerOutput {
    /// Open the default device.  Fails if no output device is available.
    pub fn open() -> Result<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("council-voice-audio".to_string())
            .spawn(move || audio_thread(command_rx, ready_tx))
            .context("failed to spawn audio thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("audio thread exited during startup"))??;
        info!("Opened default audio output");

        Ok(Self {
            commands,
            pending: None,
        })
    }
}

impl AudioOutput for SpeakerOutput {
    fn load(&mut self, payload: &AudioPayload, events: OutputEvents) -> Result<()> {
        let source = Decoder::new(Cursor::new(payload.data.to_vec()))
            .with_context(|| format!("cannot decode {} payload", payload.content_type))?;
        self.pending = Some((source, events));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let (source, events) = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("play called with nothing loaded"))?;
        let (done, done_rx) = mpsc::channel();
        self.commands
            .send(SpeakerCommand::Play {
                source,
                events,
                done,
            })
            .map_err(|_| anyhow!("audio thread is gone"))?;
        done_rx
            .recv()
            .map_err(|_| anyhow!("audio thread is gone"))?
    }

    fn stop(&mut self) {
        self.pending = None;
        let _ = self.commands.send(SpeakerCommand::Stop);
    }

    fn name(&self) -> &str {
        "speaker"
    }
}

fn audio_thread(commands: mpsc::Receiver<SpeakerCommand>, ready: mpsc::Sender<Result<()>>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(anyhow!("no audio output device: {}", e)));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut current: Option<(Sink, OutputEvents)> = None;

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(SpeakerCommand::Play {
                source,
                events,
                done,
            }) => {
                if let Some((sink, _)) = current.take() {
                    sink.stop();
                }
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        sink.append(source);
                        sink.play();
                        current = Some((sink, events));
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to create audio sink");
                        let _ = done.send(Err(anyhow!("failed to create audio sink: {}", e)));
                    }
                }
            }
            Ok(SpeakerCommand::Stop) => {
                if let Some((sink, _)) = current.take() {
                    sink.stop();
                    debug!("Speaker stopped");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let drained = current.as_ref().is_some_and(|(sink, _)| sink.empty());
        if drained {
            if let Some((_, events)) = current.take() {
                events.finished();
            }
        }
    }

    if let Some((sink, _)) = current.take() {
        sink.stop();
    }
    debug!("Audio thread exiting");
}
