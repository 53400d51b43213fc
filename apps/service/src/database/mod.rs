/// Database abstraction layer
///
/// Monitor definitions, check history and the durable task queue all live
/// in one LibSQL database. The worker pool and scheduler only see the narrow
/// [`ResultSink`] and [`MonitorSource`] traits.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl, MonitorSource, ResultSink};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
