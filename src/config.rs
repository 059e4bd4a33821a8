use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::DeviceId;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub transcript: TranscriptSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_chunk_duration_secs")]
    pub chunk_duration_secs: u64,
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f64,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: u16,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionSettings {
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Turn the settings into a per-session configuration.
    pub fn session_config(
        &self,
        session_id: Option<String>,
        device_ids: Vec<DeviceId>,
    ) -> SessionConfig {
        SessionConfig {
            session_id: session_id
                .unwrap_or_else(|| format!("meeting-{}", uuid::Uuid::new_v4())),
            device_ids,
            sample_rate: self.audio.sample_rate,
            chunk_duration: Duration::from_secs(self.audio.chunk_duration_secs),
            overlap_fraction: self.audio.overlap_fraction,
            silence_threshold: self.audio.silence_threshold,
            poll_interval: Duration::from_millis(self.audio.poll_interval_ms),
            queue_capacity: self.transcription.queue_capacity,
            worker_count: self.transcription.worker_count,
            call_timeout: Duration::from_secs(self.transcription.call_timeout_secs),
            shutdown_grace: Duration::from_secs(self.transcription.shutdown_grace_secs),
            language: self.transcription.language.clone(),
            transcript_dir: PathBuf::from(&self.transcript.output_dir),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            audio: AudioSettings::default(),
            transcription: TranscriptionSettings::default(),
            transcript: TranscriptSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            port: default_http_port(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_duration_secs: default_chunk_duration_secs(),
            overlap_fraction: default_overlap_fraction(),
            silence_threshold: default_silence_threshold(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject: default_subject(),
            language: default_language(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            call_timeout_secs: default_call_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_service_name() -> String {
    "meet-scribe".to_string()
}

fn default_http_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_chunk_duration_secs() -> u64 {
    5
}

fn default_overlap_fraction() -> f64 {
    0.2
}

fn default_silence_threshold() -> u16 {
    100
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_subject() -> String {
    "stt.transcribe".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_queue_capacity() -> usize {
    10
}

fn default_worker_count() -> usize {
    2
}

fn default_call_timeout_secs() -> u64 {
    15
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_output_dir() -> String {
    "transcripts".to_string()
}
