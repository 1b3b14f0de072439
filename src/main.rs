//! council-voice - read council responses aloud from the command line

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use council_voice::Config;
use council_voice::voice::provider::speak_api::SpeakApiSource;
use council_voice::voice::{
    AudioFetcher, AudioOutput, PlayNowOutcome, PlaybackKey, PlaybackSession, download,
};

#[derive(Parser, Debug)]
#[command(name = "council-voice")]
#[command(about = "Read LLM council responses aloud")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "COUNCIL_VOICE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one response aloud now
    Speak {
        conversation: String,
        index: usize,
    },
    /// Read several responses one after another
    Read {
        conversation: String,
        #[arg(required = true)]
        indexes: Vec<usize>,
    },
    /// Save a response's audio to a file
    Download {
        conversation: String,
        index: usize,
        /// Target directory (defaults to playback.download_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Command::Speak {
            conversation,
            index,
        } => speak(&config, PlaybackKey::new(conversation, index)).await,
        Command::Read {
            conversation,
            indexes,
        } => read(&config, &conversation, &indexes).await,
        Command::Download {
            conversation,
            index,
            out,
        } => {
            let dir = out.unwrap_or_else(|| config.playback.download_dir());
            download_one(&config, PlaybackKey::new(conversation, index), dir).await
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn speak(config: &Config, key: PlaybackKey) -> Result<()> {
    let session = PlaybackSession::from_config(config, open_output()?)?;
    match session.play_now(key.clone()).await? {
        PlayNowOutcome::Started => info!(key = %key, "Playing"),
        PlayNowOutcome::Cancelled => return Ok(()),
    }
    wait_or_interrupt(&session).await
}

async fn read(config: &Config, conversation: &str, indexes: &[usize]) -> Result<()> {
    let session = PlaybackSession::from_config(config, open_output()?)?;
    session.set_auto_read(true);
    for &index in indexes {
        let key = PlaybackKey::new(conversation, index);
        if !session.response_rendered(key.clone()).await? {
            warn!(key = %key, "Skipping duplicate response");
        }
    }
    wait_or_interrupt(&session).await
}

async fn download_one(config: &Config, key: PlaybackKey, dir: PathBuf) -> Result<()> {
    let source = SpeakApiSource::new(config.api.clone())?;
    let fetcher = AudioFetcher::new(Arc::new(source)).with_timeout(config.api.timeout()?);
    let payload = fetcher.fetch(&key).await?;
    let path = download::save_payload(&key, &payload, &dir).await?;
    println!("{}", path.display());
    Ok(())
}

/// Block until playback drains; Ctrl-C stops it.
async fn wait_or_interrupt(session: &PlaybackSession) -> Result<()> {
    tokio::select! {
        result = session.wait_until_idle() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping playback");
            session.stop().await?;
        }
    }
    Ok(())
}

#[cfg(feature = "speaker")]
fn open_output() -> Result<Box<dyn AudioOutput>> {
    let output = council_voice::voice::provider::speaker::SpeakerOutput::open()?;
    Ok(Box::new(output))
}

#[cfg(not(feature = "speaker"))]
fn open_output() -> Result<Box<dyn AudioOutput>> {
    anyhow::bail!("playback needs an audio device; rebuild with `--features speaker`")
}
