use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{MonitorSpec, Task};
use crate::queue::TaskQueue;
use crate::validation::{ValidationError, validate_monitor_spec};

/// A registered recurring entry; its tick loop dies with it
struct Entry {
    spec: MonitorSpec,
    handle: JoinHandle<()>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// What a [`MonitoringScheduler::sync`] pass changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub rejected: usize,
}

/// Monitoring scheduler - turns monitors into a stream of queued tasks
///
/// Every scheduled monitor owns one tick loop that enqueues a [`Task`] each
/// `frequency`, starting one period after registration. The scheduler never
/// waits for a task to be processed; a slow worker pool simply lets the
/// queue grow.
pub struct MonitoringScheduler {
    queue: Arc<dyn TaskQueue>,
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl MonitoringScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue, entries: Mutex::new(HashMap::new()) }
    }

    /// Schedule a monitor, replacing any entry with the same id
    pub async fn add(&self, spec: MonitorSpec) -> Result<(), ValidationError> {
        validate_monitor_spec(&spec)?;

        let id = spec.id;
        let frequency = spec.frequency;
        let handle = tokio::spawn(tick_loop(self.queue.clone(), spec.clone()));

        let replaced = self.entries.lock().await.insert(id, Entry { spec, handle });
        if replaced.is_some() {
            info!(monitor_id = %id, ?frequency, "Rescheduled monitor");
        } else {
            info!(monitor_id = %id, ?frequency, "Scheduled monitor");
        }
        Ok(())
    }

    /// Stop scheduling a monitor. Tasks already queued still run.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.entries.lock().await.remove(&id).is_some();
        if removed {
            info!(monitor_id = %id, "Unscheduled monitor");
        }
        removed
    }

    /// Reconcile with a full monitor feed
    ///
    /// Monitors missing from `specs` are removed, new ones added and changed
    /// ones rescheduled. Unchanged monitors keep their tick phase.
    pub async fn sync(&self, specs: Vec<MonitorSpec>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut entries = self.entries.lock().await;

        let wanted: HashMap<Uuid, MonitorSpec> = specs.into_iter().map(|s| (s.id, s)).collect();

        let before = entries.len();
        entries.retain(|id, _| wanted.contains_key(id));
        report.removed = before - entries.len();

        for (id, spec) in wanted {
            let is_update = match entries.get(&id) {
                Some(entry) if entry.spec == spec => continue,
                Some(_) => true,
                None => false,
            };

            if let Err(e) = validate_monitor_spec(&spec) {
                warn!(monitor_id = %id, error = %e, "Skipping invalid monitor");
                if entries.remove(&id).is_some() {
                    report.removed += 1;
                }
                report.rejected += 1;
                continue;
            }

            let handle = tokio::spawn(tick_loop(self.queue.clone(), spec.clone()));
            entries.insert(id, Entry { spec, handle });

            if is_update {
                report.updated += 1;
            } else {
                report.added += 1;
            }
        }

        if report != SyncReport::default() {
            info!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                rejected = report.rejected,
                "Synchronized monitor schedule"
            );
        }
        report
    }

    pub async fn is_scheduled(&self, id: Uuid) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    /// Ids of every scheduled monitor
    pub async fn scheduled(&self) -> Vec<Uuid> {
        self.entries.lock().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Stop every tick loop
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        info!(monitors = count, "Scheduler stopped");
    }
}

async fn tick_loop(queue: Arc<dyn TaskQueue>, spec: MonitorSpec) {
    let mut ticker = interval_at(Instant::now() + spec.frequency, spec.frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let task = Task::new(spec.clone(), Utc::now());
        match queue.enqueue(&task).await {
            Ok(task_id) => debug!(monitor_id = %spec.id, task_id, "Enqueued check"),
            Err(e) => warn!(monitor_id = %spec.id, error = %e, "Failed to enqueue check"),
        }
    }
}
