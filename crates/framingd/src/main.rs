use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use framing_core::detector::detect_checked;
use framing_core::{DetectorError, TargetSize};
use framing_io::{DirectoryCapturer, Frame, PhotoFormat};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod remote;
mod replay;
mod speech;

use config::Config;
use engine::Engine;
use remote::{ChatClient, DisabledSuggestions, SuggestionService};
use replay::ReplayDetector;
use speech::{LogVoice, QueuedSpeaker};

#[derive(Parser)]
#[command(name = "framingd", about = "Framing assistant agent", version)]
struct Args {
    /// TOML configuration file (overrides FRAMING_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recorded detection stream to drive the session (JSON lines)
    #[arg(long)]
    replay: PathBuf,

    /// Composition goal: full-body, half-body or portrait
    #[arg(long)]
    target: Option<TargetSize>,

    /// Photo encoding: jpg or png
    #[arg(long, default_value = "jpg")]
    format: PhotoFormat,
}

/// Why the frame loop ended.
#[derive(Debug)]
enum Exit {
    SessionComplete,
    ReplayFinished,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(target) = args.target {
        config.target_size = target;
    }
    for issue in config.validate() {
        tracing::warn!("config: {issue}");
    }

    tracing::info!(
        photo_dir = %config.photo_dir.display(),
        target = %config.target_size,
        max_photos = config.max_photos_per_session,
        "framingd starting"
    );

    let capture = DirectoryCapturer::new(&config.photo_dir, args.format)
        .context("photo directory unavailable")?;
    let mut detector = ReplayDetector::open(&args.replay)
        .with_context(|| format!("cannot open replay file {}", args.replay.display()))?;
    let speech = QueuedSpeaker::spawn(LogVoice).context("failed to start speech thread")?;

    let suggestions: Arc<dyn SuggestionService> = if config.api_key.is_empty() {
        Arc::new(DisabledSuggestions)
    } else {
        Arc::new(ChatClient::new(config.chat_client_config())?)
    };

    let engine = Engine::new(
        config.engine_settings(),
        Arc::new(speech),
        Arc::new(capture),
        suggestions,
    );

    let mut ticker = tokio::time::interval(config.frame_interval());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sequence: u32 = 0;

    tracing::info!("framingd ready");

    let exit = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = Frame::blank(config.frame_width, config.frame_height, sequence);
                sequence = sequence.wrapping_add(1);

                match detect_checked(&mut detector, &frame.data, frame.width, frame.height) {
                    Ok(detection) => {
                        engine.process_frame(frame, detection, Instant::now());
                    }
                    Err(DetectorError::Exhausted) => break Exit::ReplayFinished,
                    Err(e) => tracing::warn!(error = %e, seq = frame.sequence, "skipping frame"),
                }

                if engine.is_complete() {
                    break Exit::SessionComplete;
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(text)) => engine.handle_utterance(&text),
                Ok(None) => {
                    tracing::debug!("stdin closed; voice commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed; voice commands disabled");
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => break Exit::Interrupted,
        }
    };

    tracing::info!(reason = ?exit, "frame loop stopped");
    match exit {
        // Let a countdown already under way finish before closing the session.
        Exit::ReplayFinished => {
            engine.drain().await;
            engine.stop();
        }
        // Abort outstanding requests instead of waiting on their timeouts.
        Exit::SessionComplete | Exit::Interrupted => {
            engine.stop();
            engine.cancel().await;
        }
    }

    let stats = engine.stats();
    tracing::info!(
        photos = stats.photo_count,
        stable_frames = stats.stable_frame_count,
        latched = stats.photo_taken,
        target = %engine.target_size(),
        conversation = engine.in_conversation(),
        "framingd shutting down"
    );
    Ok(())
}
