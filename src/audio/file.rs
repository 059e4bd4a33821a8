use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::capture::SampleSink;
use super::device::{AudioCaptureProvider, DeviceId, InputDevice, StreamHandle};

/// How fast a file stream pushes its frames.
#[derive(Debug, Clone, Copy)]
enum StreamPace {
    /// 100ms of audio every 100ms, like a live device
    Realtime,
    /// As fast as the pipeline can take it (tests, batch processing)
    Accelerated,
}

struct RegisteredWav {
    device: InputDevice,
    path: PathBuf,
    duration: Duration,
}

/// Capture provider backed by WAV files, one virtual input device per
/// registered file. Streams 16-bit mono PCM into the sink in 100ms
/// frames, then ends when the file runs out.
pub struct WavCaptureProvider {
    pace: StreamPace,
    files: Vec<RegisteredWav>,
    streams: Mutex<HashMap<u64, Arc<AtomicBool>>>,
    next_handle: AtomicU64,
}

impl WavCaptureProvider {
    /// Provider that paces playback like a live device.
    pub fn realtime() -> Self {
        Self::with_pace(StreamPace::Realtime)
    }

    /// Provider that pushes frames as fast as possible.
    pub fn accelerated() -> Self {
        Self::with_pace(StreamPace::Accelerated)
    }

    fn with_pace(pace: StreamPace) -> Self {
        Self {
            pace,
            files: Vec::new(),
            streams: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Register a WAV file as a virtual input device.
    pub fn add_file(&mut self, path: &Path) -> Result<InputDevice> {
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();

        ensure!(
            spec.channels == 1,
            "Expected mono WAV, got {} channels: {}",
            spec.channels,
            path.display()
        );
        ensure!(
            spec.bits_per_sample == 16 && spec.sample_format == SampleFormat::Int,
            "Expected 16-bit integer PCM WAV: {}",
            path.display()
        );

        let duration =
            Duration::from_secs_f64(reader.duration() as f64 / spec.sample_rate as f64);
        let device = InputDevice {
            id: self.files.len() as DeviceId,
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };

        info!(
            "Registered {} as capture device {} ({:.1}s, {}Hz)",
            path.display(),
            device.id,
            duration.as_secs_f64(),
            spec.sample_rate
        );

        self.files.push(RegisteredWav {
            device: device.clone(),
            path: path.to_path_buf(),
            duration,
        });

        Ok(device)
    }

    /// Duration of the longest registered file.
    pub fn longest_duration(&self) -> Duration {
        self.files
            .iter()
            .map(|f| f.duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn locked_streams(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<AtomicBool>>> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AudioCaptureProvider for WavCaptureProvider {
    async fn list_input_devices(&self) -> Result<Vec<InputDevice>> {
        Ok(self.files.iter().map(|f| f.device.clone()).collect())
    }

    async fn open_stream(
        &self,
        device: DeviceId,
        sample_rate: u32,
        sink: Arc<dyn SampleSink>,
    ) -> Result<StreamHandle> {
        let Some(file) = self.files.iter().find(|f| f.device.id == device) else {
            bail!("Unknown capture device: {}", device);
        };

        let reader = WavReader::open(&file.path)
            .with_context(|| format!("Failed to open WAV file: {}", file.path.display()))?;
        let spec = reader.spec();
        ensure!(
            spec.sample_rate == sample_rate,
            "WAV sample rate {} does not match requested {}: {}",
            spec.sample_rate,
            sample_rate,
            file.path.display()
        );

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read WAV samples")?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = StreamHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.locked_streams().insert(handle.0, stop.clone());

        // 100ms frames, matching a typical live capture callback cadence
        let frame_samples = (sample_rate / 10).max(1) as usize;
        let pace = self.pace;

        tokio::spawn(async move {
            debug!("File capture stream started for device {}", device);

            for frame in samples.chunks(frame_samples) {
                if stop.load(Ordering::SeqCst) {
                    break;
                }

                sink.on_samples(frame);

                match pace {
                    StreamPace::Realtime => tokio::time::sleep(Duration::from_millis(100)).await,
                    StreamPace::Accelerated => tokio::time::sleep(Duration::from_millis(1)).await,
                }
            }

            debug!("File capture stream finished for device {}", device);
        });

        Ok(handle)
    }

    async fn close_stream(&self, handle: StreamHandle) -> Result<()> {
        if let Some(stop) = self.locked_streams().remove(&handle.0) {
            stop.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
