// Integration tests for the bounded transcription queue and worker pool
//
// These tests cover drop-oldest backpressure, at-most-once consumption,
// failure classification and cooperative shutdown.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use meet_scribe::audio::AudioChunk;
use meet_scribe::transcribe::{
    DispatcherConfig, Popped, PushResult, TaskQueue, TranscribeOptions, Transcription,
    TranscriptionDispatcher, TranscriptionProvider, TranscriptionTask,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Clone, Copy)]
enum Behavior {
    /// Return "chunk {first sample}"
    Echo,
    /// Return whitespace only
    Empty,
    /// Return an error
    Fail,
}

/// Scriptable transcription provider. The chunk's sequence number is
/// encoded in its samples so results can be traced back.
struct MockTranscriber {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicU64,
}

impl MockTranscriber {
    fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    fn with_delay(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for MockTranscriber {
    async fn transcribe(
        &self,
        samples: &[i16],
        _sample_rate: u32,
        _options: &TranscribeOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            Behavior::Echo => Ok(format!("chunk {}", samples.first().copied().unwrap_or(-1))),
            Behavior::Empty => Ok("   ".to_string()),
            Behavior::Fail => anyhow::bail!("service unavailable"),
        }
    }
}

fn chunk(sequence: u64) -> AudioChunk {
    AudioChunk {
        device_id: 3,
        samples: vec![sequence as i16; 800],
        sample_rate: 16000,
        captured_at: Utc::now(),
        sequence,
    }
}

fn config(workers: usize, capacity: usize, call_timeout: Duration) -> DispatcherConfig {
    DispatcherConfig {
        queue_capacity: capacity,
        worker_count: workers,
        call_timeout,
        poll_interval: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(2),
        options: TranscribeOptions::default(),
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ============================================================================
// Queue backpressure
// ============================================================================

fn queued_task(sequence: u64) -> TranscriptionTask {
    TranscriptionTask::new(chunk(sequence))
}

#[test]
fn test_full_queue_evicts_oldest_without_blocking() {
    let queue = TaskQueue::new(4);

    for seq in 0..4 {
        assert!(matches!(queue.push(queued_task(seq)), PushResult::Queued));
    }
    assert_eq!(queue.queued(), 4);

    // Fifth push evicts the single oldest task and succeeds immediately
    let PushResult::Evicted(old) = queue.push(queued_task(4)) else {
        panic!("expected eviction");
    };
    assert_eq!(old.chunk.sequence, 0);
    assert_eq!(queue.queued(), 4);

    // Newest present, previously-oldest absent
    let mut remaining = Vec::new();
    while let Popped::Task(task) = queue.pop() {
        remaining.push(task.chunk.sequence);
    }
    assert_eq!(remaining, vec![1, 2, 3, 4]);
}

#[test]
fn test_queue_length_is_bounded() {
    let queue = TaskQueue::new(5);

    for seq in 0..100 {
        queue.push(queued_task(seq));
        assert!(queue.queued() <= 5);
    }
}

// ============================================================================
// Worker pool
// ============================================================================

#[tokio::test]
async fn test_accepted_results_reach_the_collector() -> Result<()> {
    let provider = MockTranscriber::new(Behavior::Echo);
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(2, 8, Duration::from_secs(1)),
        provider.clone(),
        paused,
        tx,
    )?;

    for seq in 0..5 {
        dispatcher.enqueue(chunk(seq));
    }

    let mut received = Vec::new();
    while received.len() < 5 {
        let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("expected 5 accepted results")
            .expect("channel closed early");
        received.push(result);
    }

    for result in &received {
        assert_eq!(result.device_id, 3);
        assert_eq!(result.text, format!("chunk {}", result.sequence));
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.enqueued, 5);
    assert_eq!(stats.accepted, 5);
    assert_eq!(stats.failed, 0);

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_each_task_is_consumed_by_exactly_one_worker() -> Result<()> {
    let provider = MockTranscriber::with_delay(Behavior::Echo, Duration::from_millis(10));
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(4, 32, Duration::from_secs(1)),
        provider.clone(),
        paused,
        tx,
    )?;

    let total = 20u64;
    for seq in 0..total {
        dispatcher.enqueue(chunk(seq));
    }

    let mut sequences = Vec::new();
    while sequences.len() < total as usize {
        let result = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("expected all results")
            .expect("channel closed early");
        sequences.push(result.sequence);
    }

    // Every chunk transcribed once: no duplicates, no double-consumption
    sequences.sort_unstable();
    sequences.dedup();
    assert_eq!(sequences.len(), total as usize);
    assert_eq!(provider.calls(), total);

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_timeouts_are_discarded_and_counted() -> Result<()> {
    let provider = MockTranscriber::with_delay(Behavior::Echo, Duration::from_millis(500));
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(2, 8, Duration::from_millis(50)),
        provider,
        paused,
        tx,
    )?;

    dispatcher.enqueue(chunk(0));
    dispatcher.enqueue(chunk(1));

    assert!(
        wait_until(|| dispatcher.stats().timed_out == 2, Duration::from_secs(3)).await,
        "both calls should time out"
    );
    assert_eq!(dispatcher.stats().accepted, 0);
    assert!(rx.try_recv().is_err());

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_provider_errors_are_not_retried() -> Result<()> {
    let provider = MockTranscriber::new(Behavior::Fail);
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(2, 8, Duration::from_secs(1)),
        provider.clone(),
        paused,
        tx,
    )?;

    for seq in 0..3 {
        dispatcher.enqueue(chunk(seq));
    }

    assert!(
        wait_until(|| dispatcher.stats().failed == 3, Duration::from_secs(3)).await,
        "all calls should fail"
    );
    // At-most-once: one call per chunk, no retries
    assert_eq!(provider.calls(), 3);
    assert!(rx.try_recv().is_err());

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_results_are_discarded() -> Result<()> {
    let provider = MockTranscriber::new(Behavior::Empty);
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(2, 8, Duration::from_secs(1)),
        provider,
        paused,
        tx,
    )?;

    for seq in 0..4 {
        dispatcher.enqueue(chunk(seq));
    }

    assert!(
        wait_until(|| dispatcher.stats().empty == 4, Duration::from_secs(3)).await,
        "all results should be classified as empty"
    );
    assert_eq!(dispatcher.stats().accepted, 0);
    assert!(rx.try_recv().is_err());

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_paused_tasks_are_discarded_before_the_provider() -> Result<()> {
    let provider = MockTranscriber::new(Behavior::Echo);
    let paused = Arc::new(AtomicBool::new(true));
    let (tx, _rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(2, 8, Duration::from_secs(1)),
        provider.clone(),
        paused,
        tx,
    )?;

    for seq in 0..3 {
        dispatcher.enqueue(chunk(seq));
    }

    assert!(
        wait_until(
            || dispatcher.stats().discarded_paused == 3,
            Duration::from_secs(3)
        )
        .await,
        "paused chunks should be discarded"
    );
    assert_eq!(provider.calls(), 0);

    dispatcher.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_exits_within_grace_and_accepts_nothing_after() -> Result<()> {
    let provider = MockTranscriber::with_delay(Behavior::Echo, Duration::from_millis(200));
    let paused = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Transcription>(100);

    let dispatcher = TranscriptionDispatcher::spawn(
        3,
        config(1, 10, Duration::from_secs(1)),
        provider,
        paused,
        tx,
    )?;

    // Fill the queue while the single worker is busy with the first task
    for seq in 0..6 {
        dispatcher.enqueue(chunk(seq));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    dispatcher.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_secs(2) + Duration::from_millis(500),
        "shutdown must stay within the grace period"
    );

    // Queued tasks were abandoned, not transcribed after the stop signal
    let mut accepted_after = 0;
    while let Ok(Some(_)) =
        tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
    {
        accepted_after += 1;
    }
    assert!(
        accepted_after <= 1,
        "at most the in-flight task may have completed, got {}",
        accepted_after
    );

    // New work is refused outright once stopped
    dispatcher.enqueue(chunk(99));
    assert_eq!(dispatcher.queued(), 0);

    Ok(())
}
