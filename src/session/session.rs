use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{
    AudioCaptureProvider, CaptureBuffer, ChunkConfig, ChunkExtractor, ChunkSink, DeviceId,
    ExtractorConfig, InputDevice, SampleSink, StreamHandle,
};
use crate::transcribe::{
    DispatchCounts, DispatcherConfig, TranscribeOptions, Transcription, TranscriptionDispatcher,
    TranscriptionProvider,
};
use crate::transcript::TranscriptWriter;

use super::config::SessionConfig;
use super::stats::{SessionPhase, SessionStats, TranscriptSegment};

/// Everything spawned for one capture device. Pipelines are independent:
/// a failing device never touches its siblings.
struct DevicePipeline {
    device: InputDevice,
    stream: StreamHandle,
    extractor: Option<JoinHandle<()>>,
    dispatcher: Arc<TranscriptionDispatcher>,
}

/// One start-to-stop recording-and-transcription run over one or more
/// devices.
///
/// Owns a capture buffer, chunk extractor and transcription dispatcher
/// per selected device, plus the shared transcript writer. `Stopped` is
/// terminal: a new recording always constructs a new session, with a new
/// file, new buffers and new queues.
pub struct RecordingSession {
    config: SessionConfig,
    capture: Arc<dyn AudioCaptureProvider>,
    transcriber: Arc<dyn TranscriptionProvider>,

    /// When the session was created
    started_at: DateTime<Utc>,

    phase: StdMutex<SessionPhase>,
    stopped_at: StdMutex<Option<DateTime<Utc>>>,

    /// Polled by extractors; purely cooperative cancellation
    stop_requested: Arc<AtomicBool>,

    /// Polled by workers; capture keeps running while paused
    paused: Arc<AtomicBool>,

    writer: StdMutex<Option<Arc<TranscriptWriter>>>,

    /// Accumulated transcript segments, in completion order
    segments: Arc<Mutex<Vec<TranscriptSegment>>>,

    pipelines: Mutex<Vec<DevicePipeline>>,

    /// Handle for the task that routes accepted text to the writer
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn AudioCaptureProvider>,
        transcriber: Arc<dyn TranscriptionProvider>,
    ) -> Self {
        info!("Creating recording session: {}", config.session_id);

        Self {
            config,
            capture,
            transcriber,
            started_at: Utc::now(),
            phase: StdMutex::new(SessionPhase::Idle),
            stopped_at: StdMutex::new(None),
            stop_requested: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            writer: StdMutex::new(None),
            segments: Arc::new(Mutex::new(Vec::new())),
            pipelines: Mutex::new(Vec::new()),
            collector: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase_locked()
    }

    /// Path of the transcript file, once the session has started.
    pub fn transcript_path(&self) -> Option<PathBuf> {
        self.writer().map(|w| w.path().to_path_buf())
    }

    /// Start recording.
    ///
    /// Fails fast, before any task is spawned, when the device selection
    /// is empty, contains duplicates or names devices the capture
    /// provider does not know.
    pub async fn start(&self) -> Result<()> {
        {
            let mut phase = self.phase_locked();
            match *phase {
                SessionPhase::Idle => *phase = SessionPhase::Recording,
                SessionPhase::Recording | SessionPhase::Paused => {
                    bail!("Session {} is already recording", self.config.session_id)
                }
                SessionPhase::Stopped => bail!(
                    "Session {} is stopped; create a new session to record again",
                    self.config.session_id
                ),
            }
        }

        info!("Starting recording session: {}", self.config.session_id);

        match self.spawn_pipelines().await {
            Ok(()) => {
                info!(
                    "Recording session started successfully: {}",
                    self.config.session_id
                );
                Ok(())
            }
            Err(e) => {
                *self.phase_locked() = SessionPhase::Stopped;
                *self.stopped_locked() = Some(Utc::now());
                if let Some(writer) = self.writer() {
                    let _ = writer.finalize();
                }
                Err(e)
            }
        }
    }

    async fn spawn_pipelines(&self) -> Result<()> {
        let selection = &self.config.device_ids;

        ensure!(
            !selection.is_empty(),
            "At least one capture device must be selected"
        );

        let mut seen = HashSet::new();
        for id in selection {
            ensure!(seen.insert(*id), "Device {} selected more than once", id);
        }

        let available: HashMap<DeviceId, InputDevice> = self
            .capture
            .list_input_devices()
            .await
            .context("Failed to enumerate capture devices")?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        for id in selection {
            ensure!(available.contains_key(id), "Unknown capture device: {}", id);
        }

        // All tuning knobs are validated here so nothing below can fail
        // after streams are open.
        ensure!(
            self.config.queue_capacity > 0,
            "queue_capacity must be positive"
        );
        ensure!(self.config.worker_count > 0, "worker_count must be positive");
        ensure!(
            !self.config.call_timeout.is_zero(),
            "call_timeout must be positive"
        );
        let chunk_config = ChunkConfig::from_duration(
            self.config.sample_rate,
            self.config.chunk_duration,
            self.config.overlap_fraction,
        )?;

        // The n-th selected device is always "Mic{n+1}", independent of
        // its raw id, so labels stay stable even if indices are reused.
        let header: Vec<String> = selection
            .iter()
            .enumerate()
            .map(|(pos, id)| format!("Mic{} ({})", pos + 1, available[id].name))
            .collect();

        let writer = Arc::new(TranscriptWriter::create(
            &self.config.transcript_dir,
            &header,
        )?);
        *self.writer_locked() = Some(Arc::clone(&writer));

        let (accepted_tx, mut accepted_rx) = mpsc::channel::<Transcription>(100);

        let dispatcher_config = DispatcherConfig {
            queue_capacity: self.config.queue_capacity,
            worker_count: self.config.worker_count,
            call_timeout: self.config.call_timeout,
            poll_interval: self.config.poll_interval,
            shutdown_grace: self.config.shutdown_grace,
            options: TranscribeOptions {
                language: self.config.language.clone(),
            },
        };
        let extractor_config = ExtractorConfig {
            silence_threshold: self.config.silence_threshold,
            poll_interval: self.config.poll_interval,
        };

        let mut pipelines = Vec::new();
        let mut labels: HashMap<DeviceId, String> = HashMap::new();

        for (pos, id) in selection.iter().enumerate() {
            let device = available[id].clone();
            let label = format!("Mic{}", pos + 1);

            let buffer = Arc::new(CaptureBuffer::new(
                *id,
                self.config.sample_rate,
                chunk_config,
            ));

            let stream = match self
                .capture
                .open_stream(*id, self.config.sample_rate, buffer.clone() as Arc<dyn SampleSink>)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    // Isolated: this device is skipped, the rest of the
                    // session keeps going.
                    error!(
                        "Failed to open capture stream for device {} ({}): {}",
                        id, device.name, e
                    );
                    continue;
                }
            };

            let dispatcher = Arc::new(TranscriptionDispatcher::spawn(
                *id,
                dispatcher_config.clone(),
                Arc::clone(&self.transcriber),
                Arc::clone(&self.paused),
                accepted_tx.clone(),
            )?);

            let extractor = ChunkExtractor::new(
                buffer,
                Arc::clone(&dispatcher) as Arc<dyn ChunkSink>,
                extractor_config,
                Arc::clone(&self.stop_requested),
            );

            labels.insert(*id, label);
            pipelines.push(DevicePipeline {
                device,
                stream,
                extractor: Some(tokio::spawn(extractor.run())),
                dispatcher,
            });
        }

        // Workers hold the only remaining senders; once they exit, the
        // collector drains and stops on its own.
        drop(accepted_tx);

        if pipelines.is_empty() {
            bail!("No capture device could be opened");
        }

        info!(
            "Started {} of {} device pipelines for session {}",
            pipelines.len(),
            selection.len(),
            self.config.session_id
        );

        let segments = Arc::clone(&self.segments);
        let collector_writer = Arc::clone(&writer);

        let collector = tokio::spawn(async move {
            while let Some(result) = accepted_rx.recv().await {
                let label = labels
                    .get(&result.device_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Device {}", result.device_id));

                if let Err(e) = collector_writer.append(&label, &result.text) {
                    // Persistence is best-effort; capture goes on.
                    warn!("Failed to append transcript line: {}", e);
                }

                let mut segments = segments.lock().await;
                segments.push(TranscriptSegment {
                    device_label: label,
                    text: result.text,
                    timestamp: Utc::now(),
                });
            }

            debug!("Transcript collector stopped");
        });

        *self.pipelines.lock().await = pipelines;
        *self.collector.lock().await = Some(collector);

        Ok(())
    }

    /// Pause transcription. Capture and enqueueing keep running; workers
    /// discard dispatched chunks until `resume`.
    pub fn pause(&self) -> Result<()> {
        let mut phase = self.phase_locked();
        match *phase {
            SessionPhase::Recording => {
                *phase = SessionPhase::Paused;
                self.paused.store(true, Ordering::SeqCst);
                info!("Session {} paused", self.config.session_id);
                Ok(())
            }
            SessionPhase::Paused => {
                warn!("Session {} is already paused", self.config.session_id);
                Ok(())
            }
            _ => bail!(
                "Session {} is not recording, cannot pause",
                self.config.session_id
            ),
        }
    }

    /// Resume transcription after a pause.
    pub fn resume(&self) -> Result<()> {
        let mut phase = self.phase_locked();
        match *phase {
            SessionPhase::Paused => {
                *phase = SessionPhase::Recording;
                self.paused.store(false, Ordering::SeqCst);
                info!("Session {} resumed", self.config.session_id);
                Ok(())
            }
            SessionPhase::Recording => {
                warn!("Session {} is not paused", self.config.session_id);
                Ok(())
            }
            _ => bail!(
                "Session {} is not recording, cannot resume",
                self.config.session_id
            ),
        }
    }

    /// Stop recording, finalize the transcript and return final stats.
    ///
    /// Shutdown is cooperative and bounded: extractors and workers get
    /// the configured grace period, then stragglers are abandoned rather
    /// than blocking the caller.
    pub async fn stop(&self) -> Result<SessionStats> {
        let already_stopped = {
            let mut phase = self.phase_locked();
            match *phase {
                SessionPhase::Recording | SessionPhase::Paused => {
                    *phase = SessionPhase::Stopped;
                    false
                }
                SessionPhase::Stopped => {
                    warn!("Session {} is already stopped", self.config.session_id);
                    true
                }
                SessionPhase::Idle => {
                    bail!("Session {} was never started", self.config.session_id)
                }
            }
        };

        if already_stopped {
            return Ok(self.stats().await);
        }

        info!("Stopping recording session: {}", self.config.session_id);

        self.stop_requested.store(true, Ordering::SeqCst);
        *self.stopped_locked() = Some(Utc::now());

        let mut pipelines = self.pipelines.lock().await;

        // Close capture streams first so no further samples arrive.
        for pipeline in pipelines.iter() {
            if let Err(e) = self.capture.close_stream(pipeline.stream).await {
                warn!(
                    "Failed to close capture stream for device {}: {}",
                    pipeline.device.id, e
                );
            }
        }

        // Extractors observe the stop flag within one poll interval.
        let extractors: Vec<_> = pipelines
            .iter_mut()
            .filter_map(|p| p.extractor.take())
            .collect();
        if tokio::time::timeout(self.config.shutdown_grace, join_all(extractors))
            .await
            .is_err()
        {
            warn!(
                "Chunk extractors did not exit within {:?}; abandoning them",
                self.config.shutdown_grace
            );
        }

        // Each dispatcher refuses new work, drains its queue and joins
        // its workers under the same grace period.
        join_all(pipelines.iter().map(|p| p.dispatcher.shutdown())).await;

        drop(pipelines);

        // All worker senders are gone by now, so the collector drains
        // whatever is left and exits.
        if let Some(collector) = self.collector.lock().await.take() {
            if tokio::time::timeout(self.config.shutdown_grace, collector)
                .await
                .is_err()
            {
                warn!(
                    "Transcript collector did not exit within {:?}",
                    self.config.shutdown_grace
                );
            }
        }

        if let Some(writer) = self.writer() {
            if let Err(e) = writer.finalize() {
                error!("Failed to finalize transcript: {}", e);
            }
        }

        info!("Recording session stopped: {}", self.config.session_id);

        Ok(self.stats().await)
    }

    /// Current session statistics.
    pub async fn stats(&self) -> SessionStats {
        let phase = self.phase();

        let until = self.stopped_locked().unwrap_or_else(Utc::now);
        let duration = until.signed_duration_since(self.started_at);

        let mut counts = DispatchCounts::default();
        let active_devices;
        {
            let pipelines = self.pipelines.lock().await;
            active_devices = pipelines.len();
            for pipeline in pipelines.iter() {
                counts += pipeline.dispatcher.stats();
            }
        }

        let lines_written = self.writer().map(|w| w.lines_written()).unwrap_or(0);

        SessionStats {
            phase,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            active_devices,
            chunks_dispatched: counts.enqueued,
            chunks_evicted: counts.evicted,
            accepted: counts.accepted,
            empty: counts.empty,
            timed_out: counts.timed_out,
            failed: counts.failed,
            discarded_paused: counts.discarded_paused,
            lines_written,
        }
    }

    /// Accumulated transcript, in completion order.
    pub async fn transcript(&self) -> Vec<TranscriptSegment> {
        self.segments.lock().await.clone()
    }

    fn writer(&self) -> Option<Arc<TranscriptWriter>> {
        self.writer_locked().clone()
    }

    fn phase_locked(&self) -> MutexGuard<'_, SessionPhase> {
        self.phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stopped_locked(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.stopped_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writer_locked(&self) -> MutexGuard<'_, Option<Arc<TranscriptWriter>>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
