use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{DEFAULT_PENDING_TIMEOUT, Delivery, QueueError, TaskId, TaskQueue};
use crate::monitoring::types::Task;

struct Claim {
    consumer: String,
    at: Instant,
}

struct Entry {
    task: Task,
    claim: Option<Claim>,
    deliveries: u32,
}

#[derive(Default)]
struct State {
    next_id: TaskId,
    entries: BTreeMap<TaskId, Entry>,
}

/// In-process queue, for tests and single-node deployments that can afford
/// to lose queued work on restart
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    pending_timeout: Duration,
    poll_interval: Duration,
}

impl MemoryQueue {
    pub fn new(pending_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(State { next_id: 1, entries: BTreeMap::new() }),
            notify: Notify::new(),
            pending_timeout,
            poll_interval,
        }
    }

    async fn try_claim(&self, consumer: &str) -> Option<Delivery> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let (id, entry) = state.entries.iter_mut().find(|(_, entry)| match &entry.claim {
            None => true,
            Some(claim) => now.duration_since(claim.at) >= self.pending_timeout,
        })?;

        if let Some(previous) = &entry.claim {
            warn!(
                task_id = *id,
                previous_consumer = %previous.consumer,
                consumer,
                "Reclaiming task whose pending window expired"
            );
        }

        entry.claim = Some(Claim { consumer: consumer.to_string(), at: now });
        entry.deliveries += 1;

        Some(Delivery {
            id: *id,
            task: entry.task.clone(),
            consumer: consumer.to_string(),
            attempt: entry.deliveries,
        })
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TIMEOUT, Duration::from_millis(500))
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &Task) -> Result<TaskId, QueueError> {
        let id = {
            let mut state = self.state.lock().await;
            let id = state.next_id;
            state.next_id += 1;
            state.entries.insert(id, Entry { task: task.clone(), claim: None, deliveries: 0 });
            id
        };

        self.notify.notify_one();
        Ok(id)
    }

    async fn dequeue(&self, consumer: &str) -> Result<Delivery, QueueError> {
        loop {
            if let Some(delivery) = self.try_claim(consumer).await {
                return Ok(delivery);
            }

            // Expired claims are only noticed by polling
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, id: TaskId) -> Result<(), QueueError> {
        if self.state.lock().await.entries.remove(&id).is_none() {
            debug!(task_id = id, "Ack for unknown task ignored");
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.entries.len())
    }

    async fn pending_count(&self) -> Result<usize, QueueError> {
        let state = self.state.lock().await;
        Ok(state.entries.values().filter(|entry| entry.claim.is_some()).count())
    }
}
