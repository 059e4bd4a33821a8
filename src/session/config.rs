use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::DeviceId;

/// Configuration for a recording session.
///
/// Consumed at `start`; a fresh session gets a fresh copy, nothing is
/// shared across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g. "meeting-2026-08-06-standup")
    pub session_id: String,

    /// Selected capture devices, in order. The n-th entry is labelled
    /// "Mic{n+1}" in the transcript regardless of its raw id.
    pub device_ids: Vec<DeviceId>,

    /// Capture sample rate in Hz (16kHz is what STT models expect)
    pub sample_rate: u32,

    /// Duration of each transcription chunk
    pub chunk_duration: Duration,

    /// Fraction of a chunk retained into the next one (0.2 = 20%)
    pub overlap_fraction: f64,

    /// Peak amplitude below which a chunk is considered silence
    pub silence_threshold: u16,

    /// Extractor and worker poll interval
    pub poll_interval: Duration,

    /// Transcription queue capacity per device
    pub queue_capacity: usize,

    /// Transcription workers per device
    pub worker_count: usize,

    /// Hard per-call transcription timeout
    pub call_timeout: Duration,

    /// How long `stop` waits for workers before abandoning them
    pub shutdown_grace: Duration,

    /// Language tag passed to the transcription service
    pub language: String,

    /// Directory transcript files are written to
    pub transcript_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("meeting-{}", uuid::Uuid::new_v4()),
            device_ids: Vec::new(),
            sample_rate: 16000,
            chunk_duration: Duration::from_secs(5),
            overlap_fraction: 0.2,
            silence_threshold: 100,
            poll_interval: Duration::from_millis(50),
            queue_capacity: 10,
            worker_count: 2,
            call_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(5),
            language: "pt-BR".to_string(),
            transcript_dir: PathBuf::from("transcripts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();

        assert!(config.session_id.starts_with("meeting-"));
        assert!(config.device_ids.is_empty());
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.chunk_duration, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.worker_count, 2);
        // Timeout should comfortably exceed the chunk duration
        assert!(config.call_timeout >= 2 * config.chunk_duration);
    }
}
