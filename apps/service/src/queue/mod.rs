//! Task queue adapter
//!
//! The scheduler appends tasks and the worker pool consumes them; neither
//! knows which transport sits underneath. Delivery is at-least-once: a task
//! handed to a consumer stays pending until acknowledged, and becomes
//! claimable by any consumer again once its pending window has elapsed.

mod durable;
mod error;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::monitoring::types::Task;
use crate::validation::MAX_TIMEOUT;

pub use durable::LibsqlQueue;
pub use error::QueueError;
pub use memory::MemoryQueue;

/// Room left after the longest probe for persisting its result and acking
pub const ACK_MARGIN: Duration = Duration::from_secs(60);

/// Default pending window: the longest probe a monitor may configure plus
/// [`ACK_MARGIN`], so a live consumer is never overtaken by a redelivery
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(MAX_TIMEOUT.as_secs() + ACK_MARGIN.as_secs());

/// Whether a pending window outlasts every valid probe plus [`ACK_MARGIN`]
pub fn covers_longest_probe(pending_timeout: Duration) -> bool {
    pending_timeout >= MAX_TIMEOUT + ACK_MARGIN
}

/// Queue-assigned delivery id
pub type TaskId = i64;

/// A task handed to one consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: TaskId,
    pub task: Task,
    pub consumer: String,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Ordered, multi-consumer channel with explicit acknowledgement
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task to the tail of the queue
    async fn enqueue(&self, task: &Task) -> Result<TaskId, QueueError>;

    /// Claim the oldest claimable task for `consumer`, waiting while there is none
    async fn dequeue(&self, consumer: &str) -> Result<Delivery, QueueError>;

    /// Remove a task for good. Acknowledging an unknown id is a no-op.
    async fn ack(&self, id: TaskId) -> Result<(), QueueError>;

    /// Tasks not yet acknowledged, pending or not
    async fn len(&self) -> Result<usize, QueueError>;

    /// Tasks currently held by a consumer
    async fn pending_count(&self) -> Result<usize, QueueError>;

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }
}
