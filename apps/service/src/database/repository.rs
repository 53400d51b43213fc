use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{Monitor, from_result_key, result_key};
use crate::monitoring::types::{CheckRecord, MonitorSpec, RequestBody};
use crate::pool::{LibsqlPool, PooledConnection};

const MONITOR_COLUMNS: &str = "id, uuid, name, method, url, headers, body, body_content_type, timeout_ms, frequency_ms, assertions, enabled, created_at, updated_at";

const RESULT_COLUMNS: &str =
    "monitor_uuid, timestamp, status, result, verdicts, error_message";

/// Feed of monitors that should currently be scheduled
#[async_trait]
pub trait MonitorSource: Send + Sync {
    async fn enabled_monitors(&self) -> Result<Vec<MonitorSpec>>;
}

/// Durable destination for completed checks
///
/// Saving is idempotent per (monitor, timestamp): storing the same check
/// twice keeps the first copy and reports `false`.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save_check_result(&self, record: &CheckRecord) -> Result<bool>;
}

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: MonitorSource + ResultSink {
    /// Get all enabled monitors
    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get a monitor by UUID
    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>>;

    /// Insert or update a monitor, keyed by its UUID
    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Delete a monitor by UUID; returns whether it existed
    async fn delete_monitor(&self, uuid: Uuid) -> Result<bool>;

    /// Most recent results for a monitor, newest first
    async fn get_recent_results(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<CheckRecord>>;

    /// Results with `from <= timestamp < to`, oldest first
    async fn get_results_between(
        &self,
        monitor_uuid: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get().await?)
    }

    fn monitor_from_row(row: &Row) -> Result<Monitor> {
        let uuid: String = row.get(1)?;
        let headers: String = row.get(5)?;
        let body: Option<Vec<u8>> = row.get(6)?;
        let content_type: Option<String> = row.get(7)?;
        let assertions: String = row.get(10)?;

        let spec = MonitorSpec {
            id: Uuid::parse_str(&uuid)?,
            method: row.get(3)?,
            url: row.get(4)?,
            headers: serde_json::from_str(&headers)?,
            body: body.map(|data| RequestBody { content_type: content_type.unwrap_or_default(), data }),
            timeout: Duration::from_millis(row.get::<i64>(8)? as u64),
            frequency: Duration::from_millis(row.get::<i64>(9)? as u64),
            assertions: serde_json::from_str(&assertions)?,
        };

        Ok(Monitor {
            id: Some(row.get(0)?),
            name: row.get(2)?,
            spec,
            enabled: row.get::<i64>(11)? != 0,
            created_at: Monitor::i64_to_timestamp(row.get(12)?),
            updated_at: Monitor::i64_to_timestamp(row.get(13)?),
        })
    }

    fn record_from_row(row: &Row) -> Result<CheckRecord> {
        let uuid: String = row.get(0)?;
        let status: String = row.get(2)?;
        let result: Option<String> = row.get(3)?;
        let verdicts: String = row.get(4)?;

        Ok(CheckRecord {
            monitor_id: Uuid::parse_str(&uuid)?,
            timestamp: from_result_key(row.get(1)?),
            status: status.parse().map_err(anyhow::Error::msg)?,
            result: result.as_deref().map(serde_json::from_str).transpose()?,
            verdicts: serde_json::from_str(&verdicts)?,
            error_message: row.get(5)?,
        })
    }

    async fn query_records(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<CheckRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::record_from_row(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl MonitorSource for DatabaseImpl {
    async fn enabled_monitors(&self) -> Result<Vec<MonitorSpec>> {
        Ok(self.get_enabled_monitors().await?.into_iter().map(|monitor| monitor.spec).collect())
    }
}

#[async_trait]
impl ResultSink for DatabaseImpl {
    async fn save_check_result(&self, record: &CheckRecord) -> Result<bool> {
        let conn = self.get_conn().await?;
        let result = record.result.as_ref().map(serde_json::to_string).transpose()?;
        let status_code = record.result.as_ref().map(|r| r.response.status_code as i64);
        let latency_ms = record.result.as_ref().map(|r| r.timing.total.as_millis() as i64);

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO check_results (monitor_uuid, timestamp, status, status_code, latency_ms, result, verdicts, error_message, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.monitor_id.to_string(),
                    result_key(record.timestamp),
                    record.status.to_string(),
                    status_code,
                    latency_ms,
                    result,
                    serde_json::to_string(&record.verdicts)?,
                    record.error_message.clone(),
                    Utc::now().timestamp()
                ],
            )
            .await?;

        Ok(inserted > 0)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = 1 ORDER BY id"), ())
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(Self::monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE uuid = ?"),
                params![uuid.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;
        let spec = &monitor.spec;

        let mut rows = conn
            .query(
                "INSERT INTO monitors (uuid, name, method, url, headers, body, body_content_type, timeout_ms, frequency_ms, assertions, enabled, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(uuid) DO UPDATE SET
                    name = excluded.name,
                    method = excluded.method,
                    url = excluded.url,
                    headers = excluded.headers,
                    body = excluded.body,
                    body_content_type = excluded.body_content_type,
                    timeout_ms = excluded.timeout_ms,
                    frequency_ms = excluded.frequency_ms,
                    assertions = excluded.assertions,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    spec.id.to_string(),
                    monitor.name.clone(),
                    spec.method.clone(),
                    spec.url.clone(),
                    serde_json::to_string(&spec.headers)?,
                    spec.body.as_ref().map(|body| body.data.clone()),
                    spec.body.as_ref().map(|body| body.content_type.clone()),
                    spec.timeout.as_millis() as i64,
                    spec.frequency.as_millis() as i64,
                    serde_json::to_string(&spec.assertions)?,
                    if monitor.enabled { 1 } else { 0 },
                    Monitor::timestamp_to_i64(monitor.created_at),
                    Monitor::timestamp_to_i64(monitor.updated_at)
                ],
            )
            .await?;

        let row = rows.next().await?.ok_or(libsql::Error::QueryReturnedNoRows)?;
        Ok(row.get(0)?)
    }

    async fn delete_monitor(&self, uuid: Uuid) -> Result<bool> {
        let conn = self.get_conn().await?;

        // History stays; results outlive the monitor that produced them
        let deleted = conn.execute("DELETE FROM monitors WHERE uuid = ?", params![uuid.to_string()]).await?;
        Ok(deleted > 0)
    }

    async fn get_recent_results(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<CheckRecord>> {
        self.query_records(
            &format!("SELECT {RESULT_COLUMNS} FROM check_results WHERE monitor_uuid = ? ORDER BY timestamp DESC LIMIT ?"),
            params![monitor_uuid.to_string(), limit as i64],
        )
        .await
    }

    async fn get_results_between(
        &self,
        monitor_uuid: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>> {
        self.query_records(
            &format!("SELECT {RESULT_COLUMNS} FROM check_results WHERE monitor_uuid = ? AND timestamp >= ? AND timestamp < ? ORDER BY timestamp ASC"),
            params![monitor_uuid.to_string(), result_key(from), result_key(to)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::assertions::{AssertionRule, AssertionSource, Operator};
    use crate::database::initialize_database;
    use crate::monitoring::types::{MonitorStatus, ProbeResult, ResponseData, Timing};
    use crate::pool::create_pool;

    async fn setup(dir: &tempfile::TempDir) -> DatabaseImpl {
        let pool = create_pool(dir.path().join("repo.db"), 2).await.unwrap();
        initialize_database(&pool.get().await.unwrap()).await.unwrap();
        DatabaseImpl::new_from_pool(pool)
    }

    fn spec() -> MonitorSpec {
        let mut spec = MonitorSpec::new("https://status.example.com/health", Duration::from_secs(30));
        spec.method = "POST".to_string();
        spec.headers = vec![("X-Probe".to_string(), "1".to_string())];
        spec.body =
            Some(RequestBody { content_type: "application/json".to_string(), data: b"{}".to_vec() });
        spec.assertions =
            vec![AssertionRule::new(AssertionSource::StatusCode, None, Operator::Equal, json!(200))];
        spec
    }

    fn completed(monitor_id: Uuid, timestamp: DateTime<Utc>) -> CheckRecord {
        let result = ProbeResult {
            response: ResponseData { status_code: 200, headers: vec![], body: b"ok".to_vec() },
            timing: Timing { total: Duration::from_millis(42), ..Timing::default() },
            tls: None,
        };
        CheckRecord::completed(monitor_id, timestamp, result, vec![true])
    }

    #[tokio::test]
    async fn test_monitor_upsert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(&dir).await;

        let mut monitor = Monitor::new("api", spec());
        let id = db.save_monitor(&monitor).await.unwrap();

        let stored = db.get_monitor_by_uuid(monitor.spec.id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.spec, monitor.spec);

        monitor.name = "api v2".to_string();
        monitor.spec.frequency = Duration::from_secs(120);
        assert_eq!(db.save_monitor(&monitor).await.unwrap(), id);

        let monitors = db.get_enabled_monitors().await.unwrap();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].name, "api v2");
        assert_eq!(monitors[0].spec.frequency, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_disabled_monitors_are_not_fed() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(&dir).await;

        let active = Monitor::new("active", spec());
        let mut paused = Monitor::new("paused", MonitorSpec::new("http://paused.test", Duration::from_secs(60)));
        paused.enabled = false;
        db.save_monitor(&active).await.unwrap();
        db.save_monitor(&paused).await.unwrap();

        let feed = db.enabled_monitors().await.unwrap();
        assert_eq!(feed, vec![active.spec.clone()]);

        assert!(db.delete_monitor(active.spec.id).await.unwrap());
        assert!(!db.delete_monitor(active.spec.id).await.unwrap());
        assert!(db.enabled_monitors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_saving_same_check_twice_keeps_one_result() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(&dir).await;
        let monitor_id = Uuid::new_v4();
        let tick = Utc::now();

        assert!(db.save_check_result(&completed(monitor_id, tick)).await.unwrap());
        assert!(!db.save_check_result(&completed(monitor_id, tick)).await.unwrap());

        let results = db.get_recent_results(monitor_id, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, MonitorStatus::Up);
        assert_eq!(results[0].verdicts, vec![true]);
        assert_eq!(results[0].result.as_ref().unwrap().timing.total, Duration::from_millis(42));
    }

    #[tokio::test]
    async fn test_result_queries_order_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(&dir).await;
        let monitor_id = Uuid::new_v4();
        let start = Utc::now();

        for minute in 0..5 {
            let tick = start + TimeDelta::minutes(minute);
            db.save_check_result(&completed(monitor_id, tick)).await.unwrap();
        }
        let failure = CheckRecord::failed(
            monitor_id,
            start + TimeDelta::minutes(5),
            "probe failed during dns lookup: no such host".to_string(),
        );
        db.save_check_result(&failure).await.unwrap();

        let recent = db.get_recent_results(monitor_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, MonitorStatus::Error);
        assert!(recent[0].result.is_none());
        assert!(recent[0].timestamp > recent[1].timestamp);

        let window = db
            .get_results_between(monitor_id, start + TimeDelta::minutes(1), start + TimeDelta::minutes(3))
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
        assert!(window[0].timestamp < window[1].timestamp);

        assert!(db.get_recent_results(Uuid::new_v4(), 10).await.unwrap().is_empty());
    }
}
