use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::{Probe, ProbeRequest};
use super::types::{CheckRecord, Task};
use crate::assertions;
use crate::database::ResultSink;
use crate::queue::{Delivery, TaskQueue};

/// Pause before a consumer retries after the queue itself failed
const DEQUEUE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Worker pool - consumes queued tasks, probes, evaluates and persists
///
/// `concurrency` consumer loops share one queue, so at most that many probes
/// are in flight at once. A task is acknowledged only after its record has
/// been stored; if storing fails the task stays pending and the queue
/// redelivers it.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    probe: Arc<dyn Probe>,
    sink: Arc<dyn ResultSink>,
    concurrency: usize,
    consumer_prefix: String,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, probe: Arc<dyn Probe>, sink: Arc<dyn ResultSink>) -> Self {
        Self { queue, probe, sink, concurrency: 10, consumer_prefix: "worker".to_string() }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_consumer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.consumer_prefix = prefix.into();
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start the consumer loops. They stop once `shutdown` flips to `true`,
    /// after finishing whatever task they hold.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(concurrency = self.concurrency, "Starting worker pool");

        (0..self.concurrency)
            .map(|index| {
                let pool = self.clone();
                let consumer = format!("{}-{}", self.consumer_prefix, index);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.consume(consumer, shutdown).await })
            })
            .collect()
    }

    async fn consume(&self, consumer: String, mut shutdown: watch::Receiver<bool>) {
        debug!(consumer = %consumer, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = self.queue.dequeue(&consumer) => delivery,
            };

            match delivery {
                Ok(delivery) => {
                    if let Err(e) = self.process(&delivery).await {
                        error!(
                            consumer = %consumer,
                            task_id = delivery.id,
                            monitor_id = %delivery.task.monitor_id,
                            error = %e,
                            "Task left pending for redelivery"
                        );
                    }
                }
                Err(e) => {
                    warn!(consumer = %consumer, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(DEQUEUE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        debug!(consumer = %consumer, "Worker stopped");
    }

    /// Run one delivery to completion: check, persist, acknowledge
    ///
    /// Returns the stored record. An error means the task was not
    /// acknowledged.
    pub async fn process(&self, delivery: &Delivery) -> Result<CheckRecord> {
        let record = self.check(&delivery.task).await;

        let stored = self
            .sink
            .save_check_result(&record)
            .await
            .context("failed to persist check result")?;
        if !stored {
            debug!(task_id = delivery.id, monitor_id = %record.monitor_id, "Check result already stored");
        }

        self.queue.ack(delivery.id).await.context("failed to acknowledge task")?;

        debug!(
            task_id = delivery.id,
            monitor_id = %record.monitor_id,
            status = %record.status,
            attempt = delivery.attempt,
            "Processed check"
        );
        Ok(record)
    }

    /// Probe the task's target and evaluate its rules
    pub async fn check(&self, task: &Task) -> CheckRecord {
        let request = ProbeRequest::from(&task.spec);

        let result = match self.probe.probe(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(monitor_id = %task.monitor_id, stage = %e.stage, error = %e, "Probe failed");
                return CheckRecord::failed(task.monitor_id, task.scheduled_at, e.to_string());
            }
        };

        match assertions::assert(&result, &task.spec.assertions) {
            Ok(verdicts) => CheckRecord::completed(task.monitor_id, task.scheduled_at, result, verdicts),
            Err(e) => {
                warn!(monitor_id = %task.monitor_id, error = %e, "Assertion rules rejected");
                CheckRecord {
                    result: Some(result),
                    ..CheckRecord::failed(task.monitor_id, task.scheduled_at, e.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::assertions::{AssertionRule, AssertionSource, Operator};
    use crate::monitoring::error::{ProbeError, ProbeStage};
    use crate::monitoring::types::{MonitorSpec, MonitorStatus, ProbeResult, ResponseData};
    use crate::queue::MemoryQueue;

    /// Answers with a fixed status code, or fails for `.invalid` hosts
    struct FakeProbe {
        status_code: u16,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeProbe {
        fn new(status_code: u16) -> Self {
            Self {
                status_code,
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for FakeProbe {
        async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.url.contains(".invalid") {
                return Err(ProbeError::new(ProbeStage::DnsLookup, "no such host"));
            }
            Ok(ProbeResult {
                response: ResponseData {
                    status_code: self.status_code,
                    headers: vec![],
                    body: b"ok".to_vec(),
                },
                ..ProbeResult::default()
            })
        }
    }

    /// Keyed like the real sink; the first `failures` saves error out
    #[derive(Default)]
    struct FakeSink {
        failures: AtomicUsize,
        saved: Mutex<HashMap<(Uuid, DateTime<Utc>), CheckRecord>>,
        attempts: AtomicUsize,
    }

    impl FakeSink {
        fn failing(times: usize) -> Self {
            Self { failures: AtomicUsize::new(times), ..Self::default() }
        }
    }

    #[async_trait]
    impl ResultSink for FakeSink {
        async fn save_check_result(&self, record: &CheckRecord) -> Result<bool> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("database is locked");
            }

            let mut saved = self.saved.lock().await;
            let key = (record.monitor_id, record.timestamp);
            if saved.contains_key(&key) {
                return Ok(false);
            }
            saved.insert(key, record.clone());
            Ok(true)
        }
    }

    fn task(url: &str, assertions: Vec<AssertionRule>) -> Task {
        let mut spec = MonitorSpec::new(url, Duration::from_secs(60));
        spec.assertions = assertions;
        Task::new(spec, Utc::now())
    }

    fn pool(queue: Arc<MemoryQueue>, probe: Arc<FakeProbe>, sink: Arc<FakeSink>) -> WorkerPool {
        WorkerPool::new(queue, probe, sink)
    }

    #[tokio::test]
    async fn test_successful_check_is_persisted_then_acked() {
        let queue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(FakeSink::default());
        let workers = pool(queue.clone(), Arc::new(FakeProbe::new(503)), sink.clone());

        let rules = vec![
            AssertionRule::new(AssertionSource::StatusCode, None, Operator::LessThan, json!(500)),
            AssertionRule::new(AssertionSource::RawBody, None, Operator::Contains, json!("ok")),
        ];
        queue.enqueue(&task("https://api.test", rules)).await.unwrap();
        let delivery = queue.dequeue("w").await.unwrap();

        let record = workers.process(&delivery).await.unwrap();
        assert_eq!(record.status, MonitorStatus::Down);
        assert_eq!(record.verdicts, vec![false, true]);
        assert_eq!(record.timestamp, delivery.task.scheduled_at);
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(sink.saved.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_is_recorded_and_acked() {
        let queue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(FakeSink::default());
        let workers = pool(queue.clone(), Arc::new(FakeProbe::new(200)), sink.clone());

        queue.enqueue(&task("https://gone.invalid", vec![])).await.unwrap();
        let delivery = queue.dequeue("w").await.unwrap();

        let record = workers.process(&delivery).await.unwrap();
        assert_eq!(record.status, MonitorStatus::Error);
        assert!(record.result.is_none());
        assert!(record.error_message.unwrap().contains("dns lookup"));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_rules_keep_the_probe_result() {
        let workers = pool(
            Arc::new(MemoryQueue::default()),
            Arc::new(FakeProbe::new(200)),
            Arc::new(FakeSink::default()),
        );
        let rules =
            vec![AssertionRule::new(AssertionSource::JsonBody, Some("$.ok"), Operator::Equal, json!(true))];

        let record = workers.check(&task("https://api.test", rules)).await;
        assert_eq!(record.status, MonitorStatus::Error);
        assert!(record.result.is_some());
        assert!(record.verdicts.is_empty());
        assert!(record.error_message.unwrap().starts_with("rule 0:"));
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_task_pending() {
        let queue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(FakeSink::failing(1));
        let workers = pool(queue.clone(), Arc::new(FakeProbe::new(200)), sink.clone());

        queue.enqueue(&task("https://api.test", vec![])).await.unwrap();
        let delivery = queue.dequeue("w").await.unwrap();

        assert!(workers.process(&delivery).await.is_err());
        assert_eq!(queue.len().await.unwrap(), 1);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        assert!(sink.saved.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_task_is_stored_once() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(5), Duration::from_millis(100)));
        let sink = Arc::new(FakeSink::failing(1));
        let workers = Arc::new(pool(queue.clone(), Arc::new(FakeProbe::new(200)), sink.clone()));

        queue.enqueue(&task("https://api.test", vec![])).await.unwrap();

        let (stop, shutdown) = watch::channel(false);
        let handles = workers.spawn(shutdown);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.saved.lock().await.len(), 1);

        stop.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let queue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(FakeSink::default());
        let probe =
            Arc::new(FakeProbe { delay: Duration::from_millis(500), ..FakeProbe::new(200) });
        let workers = Arc::new(pool(queue.clone(), probe.clone(), sink.clone()).with_concurrency(2));

        for i in 0..6 {
            queue.enqueue(&task(&format!("https://api-{i}.test"), vec![])).await.unwrap();
        }

        let (stop, shutdown) = watch::channel(false);
        let handles = workers.spawn(shutdown);
        assert_eq!(handles.len(), workers.concurrency());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(sink.saved.lock().await.len(), 6);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 2);

        stop.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_is_not_claimed_twice() {
        let queue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(FakeSink::default());
        let probe = Arc::new(FakeProbe { delay: Duration::from_secs(90), ..FakeProbe::new(200) });
        let workers = Arc::new(pool(queue.clone(), probe.clone(), sink.clone()).with_concurrency(2));

        let mut slow = task("https://slow.test", vec![]);
        slow.spec.timeout = Duration::from_secs(120);
        queue.enqueue(&slow).await.unwrap();

        let (stop, shutdown) = watch::channel(false);
        let handles = workers.spawn(shutdown);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

        stop.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_idle_workers_stop_on_shutdown() {
        let workers = Arc::new(pool(
            Arc::new(MemoryQueue::default()),
            Arc::new(FakeProbe::new(200)),
            Arc::new(FakeSink::default()),
        ));

        let (stop, shutdown) = watch::channel(false);
        let handles = workers.spawn(shutdown);
        stop.send(true).unwrap();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        }
    }
}
