use std::sync::Arc;

use beacon_cache::CacheInvalidator;
use beacon_core::config::LifecycleConfig;
use beacon_store::{EventStatus, Store};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::{
    error::Result,
    queue::JobQueue,
    types::{Job, JobCall, QueueName},
};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub archived: u64,
    pub deleted: u64,
    pub test_deleted: u64,
}

impl SweepReport {
    pub fn touched(&self) -> u64 {
        self.archived + self.deleted + self.test_deleted
    }
}

/// Ages event logs: active → archived → deleted, measured from `created_at`.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    invalidator: CacheInvalidator,
    archive_after: Duration,
    delete_after: Duration,
    test_retention: Duration,
    every: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        invalidator: CacheInvalidator,
        lifecycle: &LifecycleConfig,
    ) -> Self {
        Self {
            store,
            queue,
            invalidator,
            archive_after: Duration::minutes(lifecycle.archive_after_mins),
            delete_after: Duration::hours(lifecycle.delete_after_hours),
            test_retention: Duration::hours(lifecycle.test_retention_hours),
            every: Duration::minutes(lifecycle.sweep_every_mins),
        }
    }

    pub async fn run(&self) -> Result<SweepReport> {
        self.run_at(Utc::now()).await
    }

    /// Sweep once, then enqueue the next sweep whether or not this one
    /// succeeded.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let result = self.sweep_at(now).await;
        if let Err(e) = self.schedule_next(now).await {
            error!("failed to enqueue next sweep: {e}");
        }
        result
    }

    /// One pass. Each step commits on its own, so a failure in a later step
    /// keeps the earlier steps' work.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport {
            archived: self
                .store
                .archive_event_logs(now - self.archive_after, now)
                .await?,
            ..Default::default()
        };
        report.deleted = self
            .store
            .purge_event_logs(EventStatus::Archived, now - self.delete_after)
            .await?;
        report.test_deleted = self
            .store
            .purge_event_logs(EventStatus::Test, now - self.test_retention)
            .await?;

        if report.touched() > 0 {
            info!(
                archived = report.archived,
                deleted = report.deleted,
                test_deleted = report.test_deleted,
                "event log sweep"
            );
            // Cached pages may list rows that just moved or vanished.
            if let Err(e) = self.invalidator.delete_matching("events:*").await {
                warn!("cache invalidation after sweep failed: {e}");
            }
        }
        Ok(report)
    }

    pub async fn schedule_next(&self, now: DateTime<Utc>) -> Result<Job> {
        self.queue
            .enqueue_at(QueueName::Archive, now + self.every, JobCall::Sweep)
            .await
    }
}
