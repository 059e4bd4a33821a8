// Per-device capture buffer with overlapping chunk extraction
//
// The audio runtime pushes samples into the buffer from its callback
// context; the chunk extractor drains it on its own task. These are the
// only two actors, each touching the buffer under its single lock.

use anyhow::{ensure, Result};
use std::sync::{Mutex, MutexGuard};

use super::device::DeviceId;

/// Push interface for the audio runtime's sample callback.
///
/// Implementations must return quickly: the upstream audio callback runs
/// under a hard real-time deadline and must never block on I/O or await.
pub trait SampleSink: Send + Sync {
    fn on_samples(&self, samples: &[i16]);
}

/// Sizing for overlapping chunk extraction.
///
/// Each extracted chunk is `chunk_samples` long; the trailing
/// `overlap_samples` are retained as the head of the next chunk so words
/// are not split across chunk boundaries.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    chunk_samples: usize,
    overlap_samples: usize,
}

impl ChunkConfig {
    pub fn new(chunk_samples: usize, overlap_samples: usize) -> Result<Self> {
        ensure!(chunk_samples > 0, "chunk_samples must be positive");
        ensure!(
            overlap_samples < chunk_samples,
            "overlap_samples ({}) must be smaller than chunk_samples ({})",
            overlap_samples,
            chunk_samples
        );

        Ok(Self {
            chunk_samples,
            overlap_samples,
        })
    }

    /// Derive sample counts from a chunk duration and an overlap fraction
    /// (e.g. 5s at 16kHz with 0.2 overlap = 80000 chunk / 16000 overlap).
    pub fn from_duration(
        sample_rate: u32,
        chunk_duration: std::time::Duration,
        overlap_fraction: f64,
    ) -> Result<Self> {
        ensure!(sample_rate > 0, "sample_rate must be positive");
        ensure!(
            (0.0..1.0).contains(&overlap_fraction),
            "overlap_fraction must be in [0, 1), got {}",
            overlap_fraction
        );

        let chunk_samples = (chunk_duration.as_secs_f64() * sample_rate as f64) as usize;
        let overlap_samples = (chunk_samples as f64 * overlap_fraction) as usize;

        Self::new(chunk_samples, overlap_samples)
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    pub fn overlap_samples(&self) -> usize {
        self.overlap_samples
    }

    /// Samples consumed from the buffer head per extraction.
    pub fn advance(&self) -> usize {
        self.chunk_samples - self.overlap_samples
    }
}

/// Growable sample buffer for one capture device.
///
/// `on_samples` appends (capture callback side), `try_extract` copies out
/// one chunk and drains `advance()` samples from the head (extractor
/// side). The buffer itself never drops raw samples.
pub struct CaptureBuffer {
    device_id: DeviceId,
    sample_rate: u32,
    config: ChunkConfig,
    samples: Mutex<Vec<i16>>,
}

impl CaptureBuffer {
    pub fn new(device_id: DeviceId, sample_rate: u32, config: ChunkConfig) -> Self {
        Self {
            device_id,
            sample_rate,
            config,
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        self.config
    }

    /// Number of samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.locked().len()
    }

    /// If at least one full chunk is buffered, copy it out and advance the
    /// buffer head, retaining the overlap tail. Returns `None` otherwise.
    pub fn try_extract(&self) -> Option<Vec<i16>> {
        let mut samples = self.locked();

        if samples.len() < self.config.chunk_samples() {
            return None;
        }

        let chunk = samples[..self.config.chunk_samples()].to_vec();
        samples.drain(..self.config.advance());

        Some(chunk)
    }

    // A poisoned lock only means another holder panicked mid-append or
    // mid-drain; the sample vec is still structurally valid, so keep going
    // rather than poisoning the audio callback path.
    fn locked(&self) -> MutexGuard<'_, Vec<i16>> {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SampleSink for CaptureBuffer {
    fn on_samples(&self, samples: &[i16]) {
        self.locked().extend_from_slice(samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_chunk_config_rejects_overlap_not_smaller_than_chunk() {
        assert!(ChunkConfig::new(1000, 1000).is_err());
        assert!(ChunkConfig::new(1000, 1500).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(1000, 999).is_ok());
    }

    #[test]
    fn test_chunk_config_from_duration() {
        let config =
            ChunkConfig::from_duration(16000, Duration::from_secs(5), 0.2).unwrap();

        assert_eq!(config.chunk_samples(), 80000);
        assert_eq!(config.overlap_samples(), 16000);
        assert_eq!(config.advance(), 64000);
    }

    #[test]
    fn test_chunk_config_rejects_full_overlap_fraction() {
        assert!(ChunkConfig::from_duration(16000, Duration::from_secs(5), 1.0).is_err());
        assert!(ChunkConfig::from_duration(16000, Duration::from_secs(5), -0.1).is_err());
    }

    #[test]
    fn test_extract_retains_overlap() {
        let config = ChunkConfig::new(100, 20).unwrap();
        let buffer = CaptureBuffer::new(0, 16000, config);

        let samples: Vec<i16> = (0..250).collect();
        buffer.on_samples(&samples);

        let first = buffer.try_extract().unwrap();
        assert_eq!(first.len(), 100);
        assert_eq!(first[0], 0);
        assert_eq!(first[99], 99);
        // 80 consumed, 170 left
        assert_eq!(buffer.buffered(), 170);

        let second = buffer.try_extract().unwrap();
        assert_eq!(second[0], 80);
        assert_eq!(second[99], 179);
        assert_eq!(buffer.buffered(), 90);

        // 90 < 100: not enough for a third chunk yet
        assert!(buffer.try_extract().is_none());
        assert_eq!(buffer.buffered(), 90);
    }

    #[test]
    fn test_no_sample_loss_across_extractions() {
        let config = ChunkConfig::new(100, 25).unwrap();
        let buffer = CaptureBuffer::new(0, 16000, config);

        let total = 1000usize;
        buffer.on_samples(&vec![1i16; total]);

        let mut extractions = 0usize;
        while buffer.try_extract().is_some() {
            extractions += 1;
        }

        assert_eq!(buffer.buffered(), total - extractions * config.advance());
    }

    #[test]
    fn test_incremental_appends_accumulate() {
        let config = ChunkConfig::new(100, 20).unwrap();
        let buffer = CaptureBuffer::new(0, 16000, config);

        for _ in 0..9 {
            buffer.on_samples(&[0i16; 10]);
            assert!(buffer.try_extract().is_none());
        }
        buffer.on_samples(&[0i16; 10]);

        assert!(buffer.try_extract().is_some());
    }
}
