use anyhow::Result;
use async_trait::async_trait;

/// Per-call transcription options.
///
/// Passed by reference to every call instead of living as mutable state
/// on a shared client, so concurrent workers can never race on them.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// BCP-47 language tag handed to the service (e.g. "pt-BR", "en-US")
    pub language: String,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
        }
    }
}

/// Speech-to-text seam.
///
/// Treated as an opaque, possibly slow, possibly rate-limited remote
/// call; the dispatcher wraps every invocation in a hard timeout and
/// never retries. An empty string is a valid result meaning the service
/// heard nothing intelligible.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        options: &TranscribeOptions,
    ) -> Result<String>;
}
