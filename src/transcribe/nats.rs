use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::provider::{TranscribeOptions, TranscriptionProvider};

/// Request published to the STT service.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Base64-encoded little-endian PCM16 bytes
    pub pcm: String,
    pub sample_rate: u32,
    pub language: String,
}

/// Reply from the STT service. An empty `text` means the service heard
/// nothing intelligible.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Transcription provider speaking request/reply over NATS.
///
/// The client carries no per-call state; options travel with each
/// request, so any number of workers can share one instance.
pub struct NatsTranscriber {
    client: Client,
    subject: String,
}

impl NatsTranscriber {
    /// Connect to the NATS server backing the STT service.
    pub async fn connect(url: &str, subject: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject: subject.into(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for NatsTranscriber {
    async fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        options: &TranscribeOptions,
    ) -> Result<String> {
        let pcm_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let request = TranscribeRequest {
            pcm: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
            sample_rate,
            language: options.language.clone(),
        };

        let payload = serde_json::to_vec(&request)?;

        debug!(
            "Requesting transcription on {} ({} samples, {}Hz, {})",
            self.subject,
            samples.len(),
            sample_rate,
            options.language
        );

        let reply = self
            .client
            .request(self.subject.clone(), payload.into())
            .await
            .context("Transcription request failed")?;

        let response: TranscribeResponse = serde_json::from_slice(&reply.payload)
            .context("Invalid transcription response payload")?;

        Ok(response.text)
    }
}
