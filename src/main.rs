use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use meet_scribe::audio::{AudioCaptureProvider, WavCaptureProvider};
use meet_scribe::transcribe::NatsTranscriber;
use meet_scribe::{create_router, AppState, RecordingSession, Settings};

#[derive(Parser)]
#[command(
    name = "meet-scribe",
    about = "Multi-microphone meeting transcription service"
)]
struct Cli {
    /// Settings file (extension resolved by the config loader)
    #[arg(short, long, default_value = "config/meet-scribe")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve {
        /// WAV files registered as virtual capture devices (16kHz mono)
        #[arg(long = "wav")]
        wavs: Vec<PathBuf>,
    },
    /// Record one session from WAV files acting as live microphones
    Record {
        /// One WAV file per microphone, in label order (Mic1, Mic2, ...)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("No settings loaded from {} ({}); using defaults", cli.config, e);
            Settings::default()
        }
    };

    match cli.command {
        Command::Serve { wavs } => serve(settings, wavs).await,
        Command::Record { files } => record(settings, files).await,
    }
}

async fn serve(settings: Settings, wavs: Vec<PathBuf>) -> Result<()> {
    info!("{} starting", settings.service.name);

    let mut provider = WavCaptureProvider::realtime();
    for path in &wavs {
        provider.add_file(path)?;
    }
    let capture: Arc<dyn AudioCaptureProvider> = Arc::new(provider);

    let transcriber = Arc::new(
        NatsTranscriber::connect(
            &settings.transcription.nats_url,
            settings.transcription.subject.clone(),
        )
        .await?,
    );

    let addr = format!("{}:{}", settings.service.http.bind, settings.service.http.port);
    let state = AppState::new(capture, transcriber, Arc::new(settings));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

async fn record(settings: Settings, files: Vec<PathBuf>) -> Result<()> {
    let mut provider = WavCaptureProvider::realtime();
    let mut device_ids = Vec::new();
    for path in &files {
        let device = provider.add_file(path)?;
        device_ids.push(device.id);
    }

    let input_duration = provider.longest_duration();
    let capture: Arc<dyn AudioCaptureProvider> = Arc::new(provider);

    let transcriber = Arc::new(
        NatsTranscriber::connect(
            &settings.transcription.nats_url,
            settings.transcription.subject.clone(),
        )
        .await?,
    );

    let config = settings.session_config(None, device_ids);
    let chunk_duration = config.chunk_duration;
    let session = Arc::new(RecordingSession::new(config, capture, transcriber));

    session.start().await?;
    info!("Recording started; press Ctrl-C to stop early");

    // Leave one extra chunk of slack so trailing audio gets transcribed
    let deadline = input_duration + chunk_duration + std::time::Duration::from_secs(1);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
        _ = tokio::time::sleep(deadline) => info!("Input files exhausted, stopping"),
    }

    let stats = session.stop().await?;

    info!(
        "Session finished: {} chunks dispatched, {} accepted, {} timed out, {} failed",
        stats.chunks_dispatched, stats.accepted, stats.timed_out, stats.failed
    );
    if let Some(path) = session.transcript_path() {
        info!("Transcript saved to {}", path.display());
    }

    Ok(())
}
