use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::capture::CaptureBuffer;
use super::chunk::AudioChunk;

/// Receiver for extracted chunks, implemented by the transcription
/// dispatcher. Must not block: `dispatch` runs on the extractor task.
pub trait ChunkSink: Send + Sync {
    fn dispatch(&self, chunk: AudioChunk);
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    /// Chunks whose peak amplitude is below this are never dispatched
    pub silence_threshold: u16,
    /// Sleep between buffer polls
    pub poll_interval: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 100,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Drains one device's capture buffer into fixed-duration overlapping
/// chunks and hands audible ones to the dispatcher.
///
/// Runs as a polling loop; the sleep between polls is the cooperative
/// cancellation checkpoint.
pub struct ChunkExtractor {
    buffer: Arc<CaptureBuffer>,
    sink: Arc<dyn ChunkSink>,
    config: ExtractorConfig,
    stop: Arc<AtomicBool>,
    sequence: u64,
}

impl ChunkExtractor {
    pub fn new(
        buffer: Arc<CaptureBuffer>,
        sink: Arc<dyn ChunkSink>,
        config: ExtractorConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            buffer,
            sink,
            config,
            stop,
            sequence: 0,
        }
    }

    pub async fn run(mut self) {
        let device_id = self.buffer.device_id();
        debug!("Chunk extractor started for device {}", device_id);

        while !self.stop.load(Ordering::SeqCst) {
            // Drain everything currently available before sleeping so the
            // extractor catches up after a slow tick.
            while let Some(samples) = self.buffer.try_extract() {
                let chunk = AudioChunk {
                    device_id,
                    samples,
                    sample_rate: self.buffer.sample_rate(),
                    captured_at: Utc::now(),
                    sequence: self.sequence,
                };
                self.sequence += 1;

                if chunk.peak_amplitude() < self.config.silence_threshold {
                    debug!(
                        "Discarding silent chunk {} from device {} (peak {})",
                        chunk.sequence,
                        device_id,
                        chunk.peak_amplitude()
                    );
                    continue;
                }

                self.sink.dispatch(chunk);
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        debug!("Chunk extractor stopped for device {}", device_id);
    }
}
