/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Builds the database, task queue, probe executor, scheduler and workers
/// - Is the add/remove surface used when monitors are created, edited or deleted
/// - Keeps the schedule in line with the monitor table while running
/// - Exposes the stored check history
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, QueueBackend};
use crate::database::models::Monitor;
use crate::database::{Database, DatabaseImpl, MonitorSource, initialize_database};
use crate::monitoring::{
    CheckRecord, MonitoringScheduler, Probe, ProbeExecutor, SyncReport, WorkerPool,
};
use crate::pool::LibsqlPool;
use crate::queue::{LibsqlQueue, MemoryQueue, TaskQueue};
use crate::validation::{validate_monitor_name, validate_monitor_spec};

/// Main orchestrator for the synthetics service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<DatabaseImpl>,
    queue: Arc<dyn TaskQueue>,
    scheduler: Arc<MonitoringScheduler>,
    workers: Arc<WorkerPool>,
}

impl Orchestrator {
    /// Create and run an orchestrator until `shutdown` flips to `true`
    pub async fn start(config: Config, pool: LibsqlPool, shutdown: watch::Receiver<bool>) -> Result<()> {
        let orchestrator = Self::new(config, pool).await?;
        orchestrator.run(shutdown).await
    }

    /// Create an orchestrator probing with a [`ProbeExecutor`]
    pub async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let executor = ProbeExecutor::new(config.probe.user_agent.clone(), config.probe.body_limit_bytes)
            .context("failed to set up the probe executor")?;
        info!(body_limit = executor.body_limit(), "Probe executor ready");
        Self::with_probe(config, pool, Arc::new(executor)).await
    }

    /// Create an orchestrator with a custom prober
    pub async fn with_probe(config: Config, pool: LibsqlPool, probe: Arc<dyn Probe>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        info!("Initializing database schema...");
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
        drop(conn);

        let database = Arc::new(DatabaseImpl::new_from_pool(pool.clone()));

        let queue: Arc<dyn TaskQueue> = match config.queue.backend {
            QueueBackend::Libsql => Arc::new(LibsqlQueue::new(
                pool,
                config.queue.name.clone(),
                config.queue.pending_timeout(),
                config.queue.poll_interval(),
            )),
            QueueBackend::Memory => {
                Arc::new(MemoryQueue::new(config.queue.pending_timeout(), config.queue.poll_interval()))
            }
        };
        info!(backend = %config.queue.backend, name = %config.queue.name, "Task queue ready");

        let scheduler = Arc::new(MonitoringScheduler::new(queue.clone()));
        let workers = Arc::new(
            WorkerPool::new(queue.clone(), probe, database.clone())
                .with_concurrency(config.workers.concurrency)
                .with_consumer_prefix(config.workers.consumer_prefix.clone()),
        );

        Ok(Self { config, database, queue, scheduler, workers })
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    pub fn queue(&self) -> &dyn TaskQueue {
        self.queue.as_ref()
    }

    /// Validate, store and (re)schedule a monitor
    ///
    /// A disabled monitor is stored but not scheduled. A zero timeout is
    /// replaced with the configured default.
    pub async fn upsert_monitor(&self, mut monitor: Monitor) -> Result<Monitor> {
        if monitor.spec.timeout.is_zero() {
            monitor.spec.timeout = Duration::from_millis(self.config.probe.default_timeout_ms);
        }
        validate_monitor_name(&monitor.name)?;
        validate_monitor_spec(&monitor.spec)?;

        if let Some(existing) = self.database.get_monitor_by_uuid(monitor.spec.id).await? {
            monitor.created_at = existing.created_at;
        }
        monitor.updated_at = Utc::now();
        monitor.id = Some(self.database.save_monitor(&monitor).await?);

        if monitor.enabled {
            self.scheduler.add(monitor.spec.clone()).await?;
        } else {
            self.scheduler.remove(monitor.spec.id).await;
        }

        info!(monitor_id = %monitor.spec.id, name = %monitor.name, enabled = monitor.enabled, "Saved monitor");
        Ok(monitor)
    }

    /// Delete and unschedule a monitor; its history is kept
    pub async fn remove_monitor(&self, id: Uuid) -> Result<bool> {
        let existed = self.database.delete_monitor(id).await?;
        let scheduled = self.scheduler.remove(id).await;

        if existed || scheduled {
            info!(monitor_id = %id, "Removed monitor");
        }
        Ok(existed || scheduled)
    }

    pub async fn recent_results(&self, id: Uuid, limit: usize) -> Result<Vec<CheckRecord>> {
        self.database.get_recent_results(id, limit).await
    }

    pub async fn results_between(
        &self,
        id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>> {
        self.database.get_results_between(id, from, to).await
    }

    /// Bring the schedule in line with the enabled monitors in the database
    pub async fn reload(&self) -> Result<SyncReport> {
        let monitors = self.database.enabled_monitors().await?;
        Ok(self.scheduler.sync(monitors).await)
    }

    /// Run the orchestrator until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Starting synthetics orchestrator...");

        let report = self.reload().await?;
        info!(monitors = report.added, "Loaded monitors from database");

        let handles = self.workers.spawn(shutdown.clone());

        let reload_interval = self.config.scheduler.reload_interval();
        let mut reload = tokio::time::interval_at(tokio::time::Instant::now() + reload_interval, reload_interval);
        reload.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            workers = self.workers.concurrency(),
            "Orchestrator started successfully - processing checks"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = reload.tick() => {
                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "Failed to reload monitors");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Shutting down orchestrator...");
        self.scheduler.shutdown().await;
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        let pending = self.queue.len().await.unwrap_or_default();
        info!(pending, "Orchestrator stopped");
        Ok(())
    }
}
