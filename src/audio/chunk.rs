use chrono::{DateTime, Utc};

use super::device::DeviceId;

/// One fixed-duration segment of mono PCM16 audio handed from capture to
/// transcription. Immutable once created.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Device the samples were captured from
    pub device_id: DeviceId,
    /// Mono i16 PCM samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// When the chunk was extracted from the capture buffer
    pub captured_at: DateTime<Utc>,
    /// Per-device extraction counter, increasing in capture order
    pub sequence: u64,
}

impl AudioChunk {
    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value, 0 for an empty chunk.
    ///
    /// Returned as u16 so `i16::MIN` (|-32768|) does not overflow.
    pub fn peak_amplitude(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: Vec<i16>) -> AudioChunk {
        AudioChunk {
            device_id: 0,
            samples,
            sample_rate: 16000,
            captured_at: Utc::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_duration() {
        let c = chunk(vec![0i16; 80000]);
        assert!((c.duration_secs() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(chunk(vec![]).peak_amplitude(), 0);
        assert_eq!(chunk(vec![0, 5, -12, 7]).peak_amplitude(), 12);
        assert_eq!(chunk(vec![i16::MIN]).peak_amplitude(), 32768);
    }
}
