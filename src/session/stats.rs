use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a recording session. `Stopped` is terminal; a new
/// recording always constructs a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// Statistics about a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle phase
    pub phase: SessionPhase,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Devices whose pipelines actually started
    pub active_devices: usize,

    /// Chunks handed to transcription queues across all devices
    pub chunks_dispatched: u64,

    /// Chunks evicted by drop-oldest backpressure
    pub chunks_evicted: u64,

    /// Accepted transcriptions
    pub accepted: u64,

    /// Successful calls that produced no text
    pub empty: u64,

    /// Calls cut off by the per-call timeout
    pub timed_out: u64,

    /// Calls that returned an error
    pub failed: u64,

    /// Chunks discarded because the session was paused
    pub discarded_paused: u64,

    /// Lines flushed to the transcript file
    pub lines_written: u64,
}

/// One accepted transcription kept in memory for API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Positional device label ("Mic1", "Mic2", ...)
    pub device_label: String,

    /// Transcribed text
    pub text: String,

    /// When this segment was accepted
    pub timestamp: DateTime<Utc>,
}
