//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    DeliveryError, DeliveryOutcome, DispatchSettings, Event, EventSink, OverflowPolicy, SinkKind,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::metrics::{MetricsSnapshot, SinkMetrics, WorkerState};
use crate::queue::{DeliveryQueue, EnqueueOutcome};
use crate::retry::Backoff;

/// How long a force-stopped worker gets to release its sink
const RELEASE_GRACE: Duration = Duration::from_secs(5);

/// Per-destination outcome of a shutdown
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub name: String,
    pub kind: SinkKind,
    /// Worker was cancelled at the drain deadline
    pub forced: bool,
    /// `release()` completed without error
    pub released: bool,
    pub metrics: MetricsSnapshot,
}

/// What the worker reports when it exits
#[derive(Debug)]
struct WorkerExit {
    interrupted: bool,
    release_error: Option<String>,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    kind: SinkKind,
    /// Queue shared with the worker
    queue: Arc<DeliveryQueue>,
    overflow: OverflowPolicy,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    force_stop: CancellationToken,
    /// Worker task handle
    worker_handle: JoinHandle<WorkerExit>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Cancelling `force_stop` interrupts in-flight attempts and backoff
    /// sleeps; the sink is still released.
    pub fn spawn<S: EventSink + 'static>(
        sink: S,
        settings: DispatchSettings,
        force_stop: CancellationToken,
    ) -> Self {
        let name = sink.name().to_string();
        let kind = sink.kind();
        let queue = Arc::new(DeliveryQueue::new(settings.queue_capacity));
        let metrics = Arc::new(SinkMetrics::new(&name));
        let overflow = settings.overflow.clone();

        let worker = SinkWorker {
            name: name.clone(),
            queue: Arc::clone(&queue),
            metrics: Arc::clone(&metrics),
            force_stop: force_stop.clone(),
            backoff: Backoff::new(&settings.retry),
            settings,
        };
        let worker_handle = tokio::spawn(worker.run(sink));

        Self {
            name,
            kind,
            queue,
            overflow,
            metrics,
            force_stop,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Enqueue an event according to the overflow policy
    ///
    /// Waits at most the configured block timeout; every drop is logged and
    /// counted here.
    pub async fn enqueue(&self, event: Arc<Event>) -> EnqueueOutcome {
        let outcome = self.queue.push(Arc::clone(&event), &self.overflow).await;
        match outcome {
            EnqueueOutcome::Enqueued => self.metrics.inc_enqueued(),
            EnqueueOutcome::EvictedOldest => {
                self.metrics.inc_enqueued();
                self.metrics.inc_dropped_overflow();
                warn!(sink = %self.name, "Queue full, oldest event dropped");
            }
            EnqueueOutcome::Rejected | EnqueueOutcome::TimedOut => {
                self.metrics.inc_dropped_overflow();
                warn!(
                    sink = %self.name,
                    event_id = %event.id(),
                    reason = %event.reason,
                    timed_out = outcome == EnqueueOutcome::TimedOut,
                    "Queue full, event dropped"
                );
            }
            EnqueueOutcome::Closed => {
                self.metrics.add_dropped_shutdown(1);
                debug!(sink = %self.name, event_id = %event.id(), "Sink draining, event refused");
            }
        }
        self.metrics.set_queue_len(self.queue.len());
        outcome
    }

    /// Stop accepting events; the worker keeps delivering what is queued
    pub fn begin_drain(&self) {
        self.queue.close();
        if self.metrics.state() != WorkerState::Stopped {
            self.metrics.set_state(WorkerState::Draining);
        }
    }

    /// Drain and stop the worker, force-stopping it after `grace`
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self, grace: Duration) -> SinkReport {
        self.begin_drain();
        self.stop_at(Instant::now() + grace).await
    }

    /// Wait for the worker until `deadline`, then force-stop it
    ///
    /// The queue must already be closed.
    pub async fn stop_at(mut self, deadline: Instant) -> SinkReport {
        let mut forced = false;
        let joined = match tokio::time::timeout_at(deadline, &mut self.worker_handle).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                forced = true;
                warn!(
                    sink = %self.name,
                    queued = self.queue.len(),
                    "Drain deadline passed, force-stopping worker"
                );
                self.force_stop.cancel();
                match tokio::time::timeout(RELEASE_GRACE, &mut self.worker_handle).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        error!(sink = %self.name, "Worker ignored force-stop, aborting");
                        self.worker_handle.abort();
                        None
                    }
                }
            }
        };

        let released = match joined {
            Some(Ok(exit)) => {
                forced |= exit.interrupted;
                exit.release_error.is_none()
            }
            Some(Err(e)) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                false
            }
            None => false,
        };

        debug!(sink = %self.name, forced, released, "SinkHandle shutdown complete");
        SinkReport {
            name: self.name,
            kind: self.kind,
            forced,
            released,
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Final state of one event
enum EventFate {
    Delivered,
    Failed,
    Exhausted,
    Interrupted,
}

/// Worker task state: consumes events and writes to the sink
struct SinkWorker {
    name: String,
    queue: Arc<DeliveryQueue>,
    metrics: Arc<SinkMetrics>,
    force_stop: CancellationToken,
    backoff: Backoff,
    settings: DispatchSettings,
}

impl SinkWorker {
    #[instrument(name = "sink_worker_loop", skip(self, sink), fields(sink = %self.name))]
    async fn run<S: EventSink>(mut self, mut sink: S) -> WorkerExit {
        debug!("Sink worker started");
        if self.metrics.state() == WorkerState::Starting {
            self.metrics.set_state(WorkerState::Running);
        }

        let mut interrupted = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.force_stop.cancelled() => {
                    interrupted = true;
                    break;
                }
                next = self.queue.pop() => next,
            };
            // Closed and empty: drain finished
            let Some(event) = next else { break };
            self.metrics.set_queue_len(self.queue.len());

            match self.deliver_with_retry(&mut sink, &event).await {
                EventFate::Interrupted => {
                    self.metrics.add_dropped_shutdown(1);
                    interrupted = true;
                    break;
                }
                EventFate::Delivered | EventFate::Failed | EventFate::Exhausted => {}
            }
        }

        self.queue.close();
        let abandoned = self.queue.drain_remaining().len() as u64;
        if abandoned > 0 {
            self.metrics.add_dropped_shutdown(abandoned);
            warn!(abandoned, "Queued events dropped at shutdown");
        }
        self.metrics.set_queue_len(0);

        let release_error = match sink.release().await {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Release failed on shutdown");
                Some(e.to_string())
            }
        };
        self.metrics.set_state(WorkerState::Stopped);
        debug!(interrupted, "Sink worker stopped");

        WorkerExit {
            interrupted,
            release_error,
        }
    }

    async fn deliver_with_retry<S: EventSink>(&mut self, sink: &mut S, event: &Event) -> EventFate {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let attempt_timeout = self.settings.attempt_timeout();
        self.backoff.reset();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.metrics.inc_attempts();
            if attempt > 1 {
                self.metrics.inc_retries();
            }

            let outcome = tokio::select! {
                biased;
                _ = self.force_stop.cancelled() => return EventFate::Interrupted,
                result = tokio::time::timeout(attempt_timeout, sink.deliver(event)) => {
                    result.unwrap_or_else(|_| {
                        DeliveryOutcome::Retryable(
                            DeliveryError::Timeout {
                                timeout_ms: self.settings.attempt_timeout_ms,
                            }
                            .to_string(),
                        )
                    })
                }
            };

            match outcome {
                DeliveryOutcome::Delivered => {
                    self.metrics.inc_delivered();
                    trace!(event_id = %event.id(), attempt, "Event delivered");
                    return EventFate::Delivered;
                }
                DeliveryOutcome::Fatal(reason) => {
                    self.metrics.inc_failed();
                    error!(
                        event_id = %event.id(),
                        attempt,
                        error = %reason,
                        "Delivery failed permanently, event dropped"
                    );
                    return EventFate::Failed;
                }
                DeliveryOutcome::Retryable(reason) if attempt >= max_attempts => {
                    self.metrics.inc_exhausted();
                    error!(
                        event_id = %event.id(),
                        attempt,
                        error = %reason,
                        "Retries exhausted, event dropped"
                    );
                    return EventFate::Exhausted;
                }
                DeliveryOutcome::Retryable(reason) => {
                    let delay = self.backoff.next_delay(attempt);
                    warn!(
                        event_id = %event.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Delivery failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.force_stop.cancelled() => return EventFate::Interrupted,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, RetryConfig};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Mock sink replaying scripted outcomes, then delivering
    struct ScriptedSink {
        name: String,
        script: VecDeque<DeliveryOutcome>,
        attempts: Arc<Mutex<Vec<(Instant, String)>>>,
        releases: Arc<AtomicU64>,
        delay: Duration,
    }

    impl ScriptedSink {
        fn new(name: &str, script: Vec<DeliveryOutcome>) -> Self {
            Self {
                name: name.to_string(),
                script: script.into(),
                attempts: Arc::new(Mutex::new(Vec::new())),
                releases: Arc::new(AtomicU64::new(0)),
                delay: Duration::ZERO,
            }
        }
    }

    impl EventSink for ScriptedSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SinkKind {
            SinkKind::InMemory
        }

        async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), event.reason.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script.pop_front().unwrap_or(DeliveryOutcome::Delivered)
        }

        async fn release(&mut self) -> Result<(), ContractError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings(max_attempts: u32) -> DispatchSettings {
        DispatchSettings {
            queue_capacity: 16,
            retry: RetryConfig {
                max_attempts,
                base_delay_ms: 100,
                max_delay_ms: 250,
                jitter: 0.0,
            },
            attempt_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn event(reason: &str) -> Arc<Event> {
        Arc::new(Event {
            reason: reason.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_deliver() {
        let retryable = || DeliveryOutcome::Retryable("503".into());
        let sink = ScriptedSink::new("flaky", vec![retryable(), retryable(), retryable()]);
        let attempts = Arc::clone(&sink.attempts);
        let releases = Arc::clone(&sink.releases);

        let handle = SinkHandle::spawn(sink, settings(5), CancellationToken::new());
        assert!(handle.enqueue(event("a")).await.is_accepted());

        let report = handle.shutdown(Duration::from_secs(60)).await;
        assert_eq!(report.metrics.delivered, 1);
        assert_eq!(report.metrics.attempts, 4);
        assert!(!report.forced);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let times: Vec<Instant> = attempts.lock().unwrap().iter().map(|(t, _)| *t).collect();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_drops_event() {
        let script = vec![DeliveryOutcome::Retryable("down".into()); 10];
        let sink = ScriptedSink::new("down", script);
        let handle = SinkHandle::spawn(sink, settings(3), CancellationToken::new());
        handle.enqueue(event("a")).await;
        handle.enqueue(event("b")).await;

        let report = handle.shutdown(Duration::from_secs(60)).await;
        // three attempts for `a`, three for `b`
        assert_eq!(report.metrics.attempts, 6);
        assert_eq!(report.metrics.exhausted, 2);
        assert_eq!(report.metrics.delivered, 0);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let sink = ScriptedSink::new("bad", vec![DeliveryOutcome::Fatal("401".into())]);
        let handle = SinkHandle::spawn(sink, settings(5), CancellationToken::new());
        handle.enqueue(event("a")).await;
        handle.enqueue(event("b")).await;

        let report = handle.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.metrics.failed, 1);
        assert_eq!(report.metrics.delivered, 1);
        assert_eq!(report.metrics.attempts, 2);
    }

    #[tokio::test]
    async fn test_fifo_per_destination() {
        let sink = ScriptedSink::new("fifo", vec![]);
        let attempts = Arc::clone(&sink.attempts);
        let handle = SinkHandle::spawn(sink, settings(1), CancellationToken::new());
        for r in ["e1", "e2", "e3", "e4"] {
            handle.enqueue(event(r)).await;
        }
        handle.shutdown(Duration::from_secs(5)).await;

        let order: Vec<String> = attempts.lock().unwrap().iter().map(|(_, r)| r.clone()).collect();
        assert_eq!(order, vec!["e1", "e2", "e3", "e4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let mut sink = ScriptedSink::new("slow", vec![]);
        sink.delay = Duration::from_secs(5);
        let handle = SinkHandle::spawn(sink, settings(2), CancellationToken::new());
        handle.enqueue(event("a")).await;

        let report = handle.shutdown(Duration::from_secs(60)).await;
        assert_eq!(report.metrics.attempts, 2);
        assert_eq!(report.metrics.exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_stop_at_deadline() {
        let script = vec![DeliveryOutcome::Retryable("down".into()); 100];
        let sink = ScriptedSink::new("stuck", script);
        let attempts = Arc::clone(&sink.attempts);
        let releases = Arc::clone(&sink.releases);

        let handle = SinkHandle::spawn(sink, settings(100), CancellationToken::new());
        for r in ["a", "b", "c"] {
            handle.enqueue(event(r)).await;
        }

        let started = Instant::now();
        let report = handle.shutdown(Duration::from_millis(1_000)).await;
        assert!(report.forced);
        assert!(report.released);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(report.metrics.dropped_shutdown, 3);

        let deadline = started + Duration::from_millis(1_000);
        assert!(attempts.lock().unwrap().iter().all(|(t, _)| *t <= deadline));
    }

    #[tokio::test]
    async fn test_enqueue_after_drain_is_refused() {
        let sink = ScriptedSink::new("closed", vec![]);
        let handle = SinkHandle::spawn(sink, settings(1), CancellationToken::new());
        handle.begin_drain();
        assert_eq!(handle.enqueue(event("late")).await, EnqueueOutcome::Closed);
        let report = handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.metrics.delivered, 0);
        assert_eq!(report.metrics.dropped_shutdown, 1);
    }
}
