// Bounded queue + worker pool between chunk extraction and the
// transcription service.
//
// The queue decouples capture cadence from a slow, occasionally failing
// remote call. Backpressure is drop-oldest: when the queue is full the
// stalest chunk is evicted, because transcription value decays with
// staleness and falling behind live audio is worse than losing an
// utterance. Semantics are at-most-once; nothing is ever retried.

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::audio::{AudioChunk, ChunkSink, DeviceId};

use super::provider::{TranscribeOptions, TranscriptionProvider};

/// A queued unit of transcription work. Consumed by exactly one worker;
/// may be evicted unconsumed if the queue overflows.
#[derive(Debug)]
pub struct TranscriptionTask {
    pub chunk: AudioChunk,
    pub enqueued_at: Instant,
}

impl TranscriptionTask {
    pub fn new(chunk: AudioChunk) -> Self {
        Self {
            chunk,
            enqueued_at: Instant::now(),
        }
    }
}

/// An accepted transcription flowing from a worker to the session.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub device_id: DeviceId,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub text: String,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug)]
pub enum PushResult {
    Queued,
    /// Queued after evicting the oldest task, returned here
    Evicted(TranscriptionTask),
    /// Refused because the queue is shutting down
    Rejected,
}

enum QueueItem {
    Task(TranscriptionTask),
    Shutdown,
}

/// Result of a single bounded pop.
pub enum Popped {
    Task(TranscriptionTask),
    Shutdown,
    Empty,
}

/// Bounded FIFO with drop-oldest overflow, shared by one device's
/// extractor and workers.
pub struct TaskQueue {
    capacity: usize,
    items: Mutex<VecDeque<QueueItem>>,
    stopping: AtomicBool,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently queued (shutdown sentinels excluded).
    pub fn queued(&self) -> usize {
        self.locked()
            .iter()
            .filter(|item| matches!(item, QueueItem::Task(_)))
            .count()
    }

    /// Non-blocking enqueue. A full queue evicts its oldest task to make
    /// room; a stopping queue refuses new work outright.
    pub fn push(&self, task: TranscriptionTask) -> PushResult {
        if self.stopping.load(Ordering::SeqCst) {
            return PushResult::Rejected;
        }

        let mut items = self.locked();

        let evicted = if items.len() >= self.capacity {
            match items.pop_front() {
                Some(QueueItem::Task(old)) => Some(old),
                // Sentinels are only pushed after stopping, when this
                // branch is unreachable; put one back if it ever happens.
                Some(QueueItem::Shutdown) => {
                    items.push_front(QueueItem::Shutdown);
                    None
                }
                None => None,
            }
        } else {
            None
        };

        items.push_back(QueueItem::Task(task));

        match evicted {
            Some(old) => PushResult::Evicted(old),
            None => PushResult::Queued,
        }
    }

    /// Single bounded pop; never blocks. Workers sleep between `Empty`
    /// results so shutdown stays cooperative.
    pub fn pop(&self) -> Popped {
        match self.locked().pop_front() {
            Some(QueueItem::Task(task)) => Popped::Task(task),
            Some(QueueItem::Shutdown) => Popped::Shutdown,
            None => Popped::Empty,
        }
    }

    /// Refuse further enqueues.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Queue one shutdown sentinel, bypassing capacity. One per worker
    /// lets every worker exit its pop loop exactly once.
    pub fn push_shutdown(&self) {
        self.locked().push_back(QueueItem::Shutdown);
    }

    fn locked(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Bounded queue capacity per device
    pub queue_capacity: usize,
    /// Workers per device
    pub worker_count: usize,
    /// Hard per-call transcription timeout; should exceed the chunk
    /// duration by 2-4x
    pub call_timeout: Duration,
    /// Worker sleep between empty pops
    pub poll_interval: Duration,
    /// How long shutdown waits for workers before abandoning them
    pub shutdown_grace: Duration,
    /// Options passed to every transcription call
    pub options: TranscribeOptions,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            worker_count: 2,
            call_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(5),
            options: TranscribeOptions::default(),
        }
    }
}

/// Counters kept by a dispatcher, updated lock-free by its workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub enqueued: AtomicU64,
    pub evicted: AtomicU64,
    pub accepted: AtomicU64,
    pub empty: AtomicU64,
    pub timed_out: AtomicU64,
    pub failed: AtomicU64,
    pub discarded_paused: AtomicU64,
}

/// Plain snapshot of [`DispatchStats`], summable across devices.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub enqueued: u64,
    pub evicted: u64,
    pub accepted: u64,
    pub empty: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub discarded_paused: u64,
}

impl std::ops::AddAssign for DispatchCounts {
    fn add_assign(&mut self, other: Self) {
        self.enqueued += other.enqueued;
        self.evicted += other.evicted;
        self.accepted += other.accepted;
        self.empty += other.empty;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
        self.discarded_paused += other.discarded_paused;
    }
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            evicted: self.evicted.load(Ordering::SeqCst),
            accepted: self.accepted.load(Ordering::SeqCst),
            empty: self.empty.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            discarded_paused: self.discarded_paused.load(Ordering::SeqCst),
        }
    }
}

/// Bounded queue + worker pool for one device.
///
/// Workers pop tasks, call the provider under the configured timeout and
/// send accepted text to the session's collector channel. Failures of
/// any kind are logged and dropped; the pipeline never retries.
pub struct TranscriptionDispatcher {
    device_id: DeviceId,
    queue: Arc<TaskQueue>,
    stats: Arc<DispatchStats>,
    shutdown_grace: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TranscriptionDispatcher {
    /// Validate the configuration and spawn the worker pool.
    pub fn spawn(
        device_id: DeviceId,
        config: DispatcherConfig,
        provider: Arc<dyn TranscriptionProvider>,
        paused: Arc<AtomicBool>,
        accepted_tx: mpsc::Sender<Transcription>,
    ) -> Result<Self> {
        ensure!(config.queue_capacity > 0, "queue_capacity must be positive");
        ensure!(config.worker_count > 0, "worker_count must be positive");
        ensure!(
            !config.call_timeout.is_zero(),
            "call_timeout must be positive"
        );

        let queue = Arc::new(TaskQueue::new(config.queue_capacity));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..config.worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    device_id,
                    queue: Arc::clone(&queue),
                    stats: Arc::clone(&stats),
                    provider: Arc::clone(&provider),
                    paused: Arc::clone(&paused),
                    accepted_tx: accepted_tx.clone(),
                    call_timeout: config.call_timeout,
                    poll_interval: config.poll_interval,
                    options: config.options.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Ok(Self {
            device_id,
            queue,
            stats,
            shutdown_grace: config.shutdown_grace,
            workers: Mutex::new(workers),
        })
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Tasks waiting for a worker right now.
    pub fn queued(&self) -> usize {
        self.queue.queued()
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    /// Queue a chunk for transcription. Never blocks; evicts the oldest
    /// queued chunk when full, drops the chunk entirely once stopping.
    pub fn enqueue(&self, chunk: AudioChunk) {
        let sequence = chunk.sequence;

        match self.queue.push(TranscriptionTask::new(chunk)) {
            PushResult::Queued => {
                self.stats.enqueued.fetch_add(1, Ordering::SeqCst);
            }
            PushResult::Evicted(old) => {
                self.stats.enqueued.fetch_add(1, Ordering::SeqCst);
                self.stats.evicted.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Queue full for device {}: evicted chunk {} in favor of chunk {}",
                    self.device_id, old.chunk.sequence, sequence
                );
            }
            PushResult::Rejected => {
                debug!(
                    "Dropping chunk {} for device {}: dispatcher is stopping",
                    sequence, self.device_id
                );
            }
        }
    }

    /// Stop accepting work, wake every worker with a sentinel and wait up
    /// to the grace period before abandoning stragglers.
    pub async fn shutdown(&self) {
        self.queue.stop();

        let workers = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *workers)
        };

        for _ in 0..workers.len() {
            self.queue.push_shutdown();
        }

        if workers.is_empty() {
            return;
        }

        let joined = tokio::time::timeout(self.shutdown_grace, futures::future::join_all(workers));
        if joined.await.is_err() {
            warn!(
                "Transcription workers for device {} did not exit within {:?}; abandoning them",
                self.device_id, self.shutdown_grace
            );
        }
    }
}

impl ChunkSink for TranscriptionDispatcher {
    fn dispatch(&self, chunk: AudioChunk) {
        self.enqueue(chunk);
    }
}

struct Worker {
    worker_id: usize,
    device_id: DeviceId,
    queue: Arc<TaskQueue>,
    stats: Arc<DispatchStats>,
    provider: Arc<dyn TranscriptionProvider>,
    paused: Arc<AtomicBool>,
    accepted_tx: mpsc::Sender<Transcription>,
    call_timeout: Duration,
    poll_interval: Duration,
    options: TranscribeOptions,
}

impl Worker {
    async fn run(self) {
        debug!(
            "Transcription worker {} started for device {}",
            self.worker_id, self.device_id
        );

        loop {
            let task = match self.queue.pop() {
                Popped::Task(task) => task,
                Popped::Shutdown => break,
                Popped::Empty => {
                    if self.queue.is_stopping() {
                        break;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            // Tasks still queued when the stop signal lands are drained
            // without transcribing so shutdown stays within the grace
            // period.
            if self.queue.is_stopping() {
                debug!(
                    "Discarding chunk {} from device {}: dispatcher is stopping",
                    task.chunk.sequence, self.device_id
                );
                continue;
            }

            // Paused sessions keep capturing and enqueueing; dispatched
            // chunks are simply not acted upon.
            if self.paused.load(Ordering::SeqCst) {
                self.stats.discarded_paused.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Discarding chunk {} from device {}: session is paused",
                    task.chunk.sequence, self.device_id
                );
                continue;
            }

            self.transcribe(task).await;
        }

        debug!(
            "Transcription worker {} stopped for device {}",
            self.worker_id, self.device_id
        );
    }

    async fn transcribe(&self, task: TranscriptionTask) {
        let queued_for = task.enqueued_at.elapsed();
        let chunk = task.chunk;

        debug!(
            "Worker {} transcribing chunk {} from device {} (queued {:?})",
            self.worker_id, chunk.sequence, self.device_id, queued_for
        );

        let call = self
            .provider
            .transcribe(&chunk.samples, chunk.sample_rate, &self.options);

        match tokio::time::timeout(self.call_timeout, call).await {
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::SeqCst);
                warn!(
                    "Transcription of chunk {} from device {} timed out after {:?}",
                    chunk.sequence, self.device_id, self.call_timeout
                );
            }
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    "Transcription of chunk {} from device {} failed: {}",
                    chunk.sequence, self.device_id, e
                );
            }
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    self.stats.empty.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        "Empty transcription for chunk {} from device {}",
                        chunk.sequence, self.device_id
                    );
                    return;
                }

                // A result completing during shutdown is dropped: nothing
                // is accepted after the stop signal.
                if self.queue.is_stopping() {
                    debug!(
                        "Dropping late transcription of chunk {} from device {}",
                        chunk.sequence, self.device_id
                    );
                    return;
                }

                self.stats.accepted.fetch_add(1, Ordering::SeqCst);

                let transcription = Transcription {
                    device_id: self.device_id,
                    sequence: chunk.sequence,
                    captured_at: chunk.captured_at,
                    text: text.to_string(),
                };

                if self.accepted_tx.send(transcription).await.is_err() {
                    debug!(
                        "Transcript collector is gone; dropping result for device {}",
                        self.device_id
                    );
                }
            }
        }
    }
}
