use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{Delivery, QueueError, TaskId, TaskQueue};
use crate::monitoring::types::Task;
use crate::pool::{LibsqlPool, PooledConnection};

/// Claims the oldest task that is unclaimed or whose claim has gone stale.
/// A single statement, so two consumers can never claim the same row.
const CLAIM_SQL: &str = "UPDATE queue_tasks
    SET consumer = ?1, delivered_at = ?2, delivery_count = delivery_count + 1
    WHERE id = (
        SELECT id FROM queue_tasks
        WHERE queue = ?3 AND (consumer IS NULL OR delivered_at <= ?4)
        ORDER BY id
        LIMIT 1
    )
    RETURNING id, payload, delivery_count";

/// Queue persisted in the `queue_tasks` table of the service database
///
/// Tasks survive restarts; a task claimed by a consumer that never acks is
/// picked up again once `pending_timeout` has passed. Several queues may
/// share the table, separated by name.
pub struct LibsqlQueue {
    pool: LibsqlPool,
    name: String,
    pending_timeout: Duration,
    poll_interval: Duration,
    notify: Notify,
}

impl LibsqlQueue {
    pub fn new(
        pool: LibsqlPool,
        name: impl Into<String>,
        pending_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self { pool, name: name.into(), pending_timeout, poll_interval, notify: Notify::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn get_conn(&self) -> Result<PooledConnection, QueueError> {
        Ok(self.pool.get().await?)
    }

    async fn try_claim(&self, consumer: &str) -> Result<Option<Delivery>, QueueError> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp_millis();
        let stale_before = now - self.pending_timeout.as_millis() as i64;

        let mut rows = conn
            .query(CLAIM_SQL, params![consumer, now, self.name.as_str(), stale_before])
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let id: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        let attempt = row.get::<i64>(2)? as u32;
        drop(rows);

        let task: Task = serde_json::from_str(&payload)?;
        if attempt > 1 {
            warn!(task_id = id, consumer, attempt, monitor_id = %task.monitor_id, "Redelivering task");
        }

        Ok(Some(Delivery { id, task, consumer: consumer.to_string(), attempt }))
    }

    async fn count(&self, sql: &str) -> Result<usize, QueueError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params![self.name.as_str()]).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count as usize)
    }
}

#[async_trait]
impl TaskQueue for LibsqlQueue {
    async fn enqueue(&self, task: &Task) -> Result<TaskId, QueueError> {
        let payload = serde_json::to_string(task)?;
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO queue_tasks (queue, monitor_uuid, payload, enqueued_at) VALUES (?, ?, ?, ?)",
            params![
                self.name.as_str(),
                task.monitor_id.to_string(),
                payload,
                Utc::now().timestamp_millis()
            ],
        )
        .await?;
        let id = conn.last_insert_rowid();

        self.notify.notify_one();
        Ok(id)
    }

    async fn dequeue(&self, consumer: &str) -> Result<Delivery, QueueError> {
        loop {
            if let Some(delivery) = self.try_claim(consumer).await? {
                return Ok(delivery);
            }

            // Other processes may enqueue too, so never rely on the notify alone
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, id: TaskId) -> Result<(), QueueError> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute("DELETE FROM queue_tasks WHERE id = ? AND queue = ?", params![id, self.name.as_str()])
            .await?;

        if removed == 0 {
            debug!(task_id = id, queue = %self.name, "Ack for unknown task ignored");
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        self.count("SELECT COUNT(*) FROM queue_tasks WHERE queue = ?").await
    }

    async fn pending_count(&self) -> Result<usize, QueueError> {
        self.count("SELECT COUNT(*) FROM queue_tasks WHERE queue = ? AND consumer IS NOT NULL").await
    }
}
