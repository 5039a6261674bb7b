use std::sync::Arc;

use beacon_cache::Cache;
use beacon_core::{
    config::{BeaconConfig, DEFAULT_ARCHIVE_AFTER_MINS, DEFAULT_CACHE_TTL_SECS},
    TriggerId, UserId,
};
use beacon_store::{
    EventLog, EventLogFilter, EventStatus, Store, Trigger, TriggerDraft, TriggerSpec,
    TriggerUpdate,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    executor::{FireOutcome, TriggerExecutor},
    queue::JobQueue,
    schedule::initial_due,
    types::{Job, JobCall, QueueName, ScheduledFire},
};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Page metadata returned alongside event logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub total_pages: u32,
    pub first_page: u32,
    pub last_page: u32,
    pub page: u32,
    pub previous_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl Pagination {
    fn new(total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX);
        Self {
            total,
            total_pages,
            first_page: 1,
            last_page: total_pages,
            page,
            previous_page: (page > 1).then(|| page - 1),
            next_page: (page < total_pages).then(|| page + 1),
        }
    }
}

/// One cached page of a user's event logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<EventLog>,
    pub pagination: Pagination,
}

/// What a test firing did.
#[derive(Debug, Clone, PartialEq)]
pub enum TestFiring {
    /// Scheduled drafts fire later, from the trigger queue.
    Queued(Job),
    /// Api drafts fire inline.
    Fired(FireOutcome),
}

/// Cache key of one event page.
pub fn events_page_key(user_id: &UserId, status: EventStatus, page: u32, per_page: u32) -> String {
    format!("events:{user_id}:{status}:page:{page}:per:{per_page}")
}

/// Request-facing trigger operations. Every call is scoped to the calling
/// user; another user's trigger reads as not found.
#[derive(Clone)]
pub struct TriggerService {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    executor: TriggerExecutor,
    cache: Arc<dyn Cache>,
    cache_ttl_secs: u64,
    active_window: Duration,
}

impl TriggerService {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        executor: TriggerExecutor,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            store,
            queue,
            executor,
            cache,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            active_window: Duration::minutes(DEFAULT_ARCHIVE_AFTER_MINS),
        }
    }

    /// Take the page TTL and active window from `config`.
    pub fn with_config(mut self, config: &BeaconConfig) -> Self {
        self.cache_ttl_secs = config.cache.ttl_secs;
        self.active_window = Duration::minutes(config.lifecycle.archive_after_mins);
        self
    }

    pub async fn create_trigger(&self, user_id: &UserId, draft: &TriggerDraft) -> Result<Trigger> {
        self.create_trigger_at(user_id, draft, Utc::now()).await
    }

    /// Persist a trigger, then schedule its first firing. Api triggers fire
    /// inline; a failure there is logged and the trigger stays created.
    pub async fn create_trigger_at(
        &self,
        user_id: &UserId,
        draft: &TriggerDraft,
        now: DateTime<Utc>,
    ) -> Result<Trigger> {
        let spec = draft.validate()?;
        let trigger = self.store.create_trigger(user_id, &spec, now).await?;

        match &trigger.spec {
            TriggerSpec::Scheduled { .. } => {
                self.schedule_firing(&trigger, now).await?;
            }
            TriggerSpec::Api { endpoint, payload } => {
                if let Err(e) = self.executor.fire_api(trigger.id, endpoint, payload).await {
                    warn!(trigger_id = %trigger.id, "inline api firing failed: {e}");
                }
            }
        }
        Ok(trigger)
    }

    pub async fn list_triggers(&self, user_id: &UserId) -> Result<Vec<Trigger>> {
        Ok(self.store.list_triggers(user_id).await?)
    }

    pub async fn get_trigger(&self, user_id: &UserId, id: TriggerId) -> Result<Trigger> {
        match self.store.get_trigger(id).await? {
            Some(trigger) if &trigger.user_id == user_id => Ok(trigger),
            _ => Err(SchedulerError::TriggerNotFound { id }),
        }
    }

    pub async fn update_trigger(
        &self,
        user_id: &UserId,
        id: TriggerId,
        update: &TriggerUpdate,
    ) -> Result<Trigger> {
        self.update_trigger_at(user_id, id, update, Utc::now()).await
    }

    /// Apply an allow-listed update. When the firing rule changes the
    /// generation moves on, so jobs already queued drain as no-ops, and a
    /// fresh firing is scheduled.
    pub async fn update_trigger_at(
        &self,
        user_id: &UserId,
        id: TriggerId,
        update: &TriggerUpdate,
        now: DateTime<Utc>,
    ) -> Result<Trigger> {
        let mut trigger = self.get_trigger(user_id, id).await?;
        let rescheduled = trigger.apply_update(update, now)?;
        self.store.update_trigger(&trigger).await?;
        if rescheduled {
            self.schedule_firing(&trigger, now).await?;
        }
        info!(trigger_id = %id, rescheduled, "trigger updated");
        Ok(trigger)
    }

    /// Remove the trigger. Event logs stay; queued jobs find it gone.
    pub async fn delete_trigger(&self, user_id: &UserId, id: TriggerId) -> Result<()> {
        let trigger = self.get_trigger(user_id, id).await?;
        self.store.delete_trigger(trigger.id).await?;
        Ok(())
    }

    pub async fn test_trigger(&self, user_id: &UserId, draft: &TriggerDraft) -> Result<TestFiring> {
        self.test_trigger_at(user_id, draft, Utc::now()).await
    }

    /// Fire a draft once without saving it. Logs land with status `test`.
    pub async fn test_trigger_at(
        &self,
        user_id: &UserId,
        draft: &TriggerDraft,
        now: DateTime<Utc>,
    ) -> Result<TestFiring> {
        match draft.validate()? {
            TriggerSpec::Scheduled { schedule, .. } => {
                let job = self
                    .queue
                    .enqueue_at(
                        QueueName::Trigger,
                        initial_due(&schedule, now),
                        JobCall::FireTestScheduled {
                            user_id: user_id.clone(),
                            draft: draft.clone(),
                        },
                    )
                    .await?;
                Ok(TestFiring::Queued(job))
            }
            TriggerSpec::Api { .. } => {
                let outcome = self.executor.fire_test_api(user_id, draft).await?;
                Ok(TestFiring::Fired(outcome))
            }
        }
    }

    pub async fn list_events(
        &self,
        user_id: &UserId,
        status: EventStatus,
        page: u32,
        per_page: u32,
    ) -> Result<EventPage> {
        self.list_events_at(user_id, status, page, per_page, Utc::now())
            .await
    }

    /// Page through a user's `active` or `archived` logs, newest first.
    ///
    /// `active` only lists logs younger than the archive window. Pages are
    /// cached until the next write for this user or the TTL, whichever
    /// comes first; cache trouble falls back to the store.
    ///
    /// A log written and invalidated between the store read and the cache
    /// write leaves the older page cached. The TTL bounds how long it lives.
    pub async fn list_events_at(
        &self,
        user_id: &UserId,
        status: EventStatus,
        page: u32,
        per_page: u32,
        now: DateTime<Utc>,
    ) -> Result<EventPage> {
        if status == EventStatus::Test {
            return Err(SchedulerError::InvalidRequest(
                "invalid status, use 'active' or 'archived'".into(),
            ));
        }
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let key = events_page_key(user_id, status, page, per_page);

        match self.cache.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<EventPage>(&json) {
                Ok(cached) => {
                    debug!(%key, "event page served from cache");
                    return Ok(cached);
                }
                Err(e) => warn!(%key, "discarding undecodable cached page: {e}"),
            },
            Ok(None) => {}
            Err(e) => warn!(%key, "cache read failed: {e}"),
        }

        let mut filter = EventLogFilter::for_user(user_id).with_status(status);
        if status == EventStatus::Active {
            filter.created_from = Some(now - self.active_window);
        }
        let total = self.store.count_event_logs(&filter).await?;
        filter.limit = Some(per_page);
        filter.offset = Some((page - 1).saturating_mul(per_page));
        let events = self.store.query_event_logs(&filter).await?;

        let result = EventPage {
            events,
            pagination: Pagination::new(total, page, per_page),
        };
        let json = serde_json::to_string(&result)?;
        if let Err(e) = self.cache.set(&key, &json, self.cache_ttl_secs).await {
            warn!(%key, "cache write failed: {e}");
        }
        Ok(result)
    }

    async fn schedule_firing(&self, trigger: &Trigger, now: DateTime<Utc>) -> Result<Job> {
        let TriggerSpec::Scheduled {
            schedule,
            recurrence,
        } = &trigger.spec
        else {
            return Err(SchedulerError::InvalidRequest(format!(
                "trigger {} is not scheduled",
                trigger.id
            )));
        };
        let due_at = initial_due(schedule, now);
        let job = self
            .queue
            .enqueue_at(
                QueueName::Trigger,
                due_at,
                JobCall::FireScheduled(ScheduledFire {
                    trigger_id: trigger.id,
                    recurrence: *recurrence,
                    due_at,
                    generation: trigger.generation,
                }),
            )
            .await?;
        info!(trigger_id = %trigger.id, %due_at, generation = trigger.generation, "trigger scheduled");
        Ok(job)
    }
}
