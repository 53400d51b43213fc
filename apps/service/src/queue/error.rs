use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] libsql::Error),

    #[error("queue connection unavailable: {0}")]
    Connection(String),

    #[error("task payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<deadpool::managed::PoolError<libsql::Error>> for QueueError {
    fn from(error: deadpool::managed::PoolError<libsql::Error>) -> Self {
        QueueError::Connection(error.to_string())
    }
}
