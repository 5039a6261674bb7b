use std::sync::Arc;

use beacon_cache::CacheInvalidator;
use beacon_core::{EventLogId, TriggerId, UserId};
use beacon_store::{
    EventLog, EventStatus, NewEventLog, Store, TriggerDraft, TriggerSpec, TriggerType,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    http::ApiCaller,
    queue::JobQueue,
    schedule::next_due,
    types::{JobCall, QueueName, ScheduledFire},
};

/// Why a firing did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The trigger was deleted after the job was enqueued.
    TriggerMissing,
    /// The trigger was rescheduled after the job was enqueued.
    StaleGeneration,
    /// The job's call does not match the trigger's type.
    TypeMismatch,
}

/// What one executor invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    Logged {
        event_id: EventLogId,
        /// Due time of the follow-up job, if one was enqueued.
        next_due: Option<DateTime<Utc>>,
    },
    Skipped(SkipReason),
}

impl FireOutcome {
    pub fn event_id(&self) -> Option<EventLogId> {
        match self {
            FireOutcome::Logged { event_id, .. } => Some(*event_id),
            FireOutcome::Skipped(_) => None,
        }
    }
}

/// Fires triggers and records each firing as one event log.
///
/// Holds no trigger state of its own: every invocation re-reads the
/// trigger from the store.
#[derive(Clone)]
pub struct TriggerExecutor {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    invalidator: CacheInvalidator,
    caller: Arc<dyn ApiCaller>,
}

impl TriggerExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        invalidator: CacheInvalidator,
        caller: Arc<dyn ApiCaller>,
    ) -> Self {
        Self {
            store,
            queue,
            invalidator,
            caller,
        }
    }

    pub async fn fire_scheduled(&self, fire: &ScheduledFire) -> Result<FireOutcome> {
        self.fire_scheduled_at(fire, Utc::now()).await
    }

    /// Fire a scheduled trigger as of `now` and, when recurring, enqueue
    /// the next firing with the same flag and generation.
    pub async fn fire_scheduled_at(
        &self,
        fire: &ScheduledFire,
        now: DateTime<Utc>,
    ) -> Result<FireOutcome> {
        let Some(trigger) = self.store.get_trigger(fire.trigger_id).await? else {
            debug!(trigger_id = %fire.trigger_id, "trigger gone; dropping scheduled firing");
            return Ok(FireOutcome::Skipped(SkipReason::TriggerMissing));
        };
        if trigger.generation != fire.generation {
            debug!(
                trigger_id = %trigger.id,
                job_generation = fire.generation,
                current_generation = trigger.generation,
                "trigger rescheduled; dropping stale firing"
            );
            return Ok(FireOutcome::Skipped(SkipReason::StaleGeneration));
        }
        let TriggerSpec::Scheduled { schedule, .. } = &trigger.spec else {
            warn!(trigger_id = %trigger.id, "scheduled firing for an api trigger");
            return Ok(FireOutcome::Skipped(SkipReason::TypeMismatch));
        };

        let event = self
            .log_event(NewEventLog {
                trigger_id: Some(trigger.id),
                user_id: trigger.user_id.clone(),
                response: None,
                status: EventStatus::Active,
                created_at: now,
            })
            .await?;

        let next = if fire.recurrence {
            let due = next_due(schedule, fire.due_at, now);
            let follow_up = ScheduledFire {
                due_at: due,
                ..fire.clone()
            };
            self.queue
                .enqueue_at(QueueName::Trigger, due, JobCall::FireScheduled(follow_up))
                .await?;
            Some(due)
        } else {
            None
        };

        info!(trigger_id = %trigger.id, event_id = %event.id, next_due = ?next, "scheduled trigger fired");
        Ok(FireOutcome::Logged {
            event_id: event.id,
            next_due: next,
        })
    }

    /// POST `payload` to `endpoint` and log whatever came back. Transport
    /// failures are recorded in the log, not returned.
    pub async fn fire_api(
        &self,
        trigger_id: TriggerId,
        endpoint: &str,
        payload: &Value,
    ) -> Result<FireOutcome> {
        let Some(trigger) = self.store.get_trigger(trigger_id).await? else {
            debug!(trigger_id = %trigger_id, "trigger gone; skipping api call");
            return Ok(FireOutcome::Skipped(SkipReason::TriggerMissing));
        };

        let outcome = self.caller.post_json(endpoint, payload).await;
        let event = self
            .log_event(NewEventLog {
                trigger_id: Some(trigger.id),
                user_id: trigger.user_id,
                response: Some(outcome.to_response()),
                status: EventStatus::Active,
                created_at: Utc::now(),
            })
            .await?;

        info!(trigger_id = %trigger_id, event_id = %event.id, failed = outcome.is_failure(), "api trigger fired");
        Ok(FireOutcome::Logged {
            event_id: event.id,
            next_due: None,
        })
    }

    /// Dry-run a scheduled draft: one `test` log, no recurrence.
    pub async fn fire_test_scheduled(
        &self,
        user_id: &UserId,
        draft: &TriggerDraft,
    ) -> Result<FireOutcome> {
        if let spec @ TriggerSpec::Api { .. } = draft.validate()? {
            return Err(wrong_type(TriggerType::Scheduled, &spec));
        }
        let event = self
            .log_event(NewEventLog {
                trigger_id: None,
                user_id: user_id.clone(),
                response: None,
                status: EventStatus::Test,
                created_at: Utc::now(),
            })
            .await?;
        info!(user_id = %user_id, event_id = %event.id, "test scheduled trigger fired");
        Ok(FireOutcome::Logged {
            event_id: event.id,
            next_due: None,
        })
    }

    /// Dry-run an api draft: the call is real, the log is `test`.
    pub async fn fire_test_api(&self, user_id: &UserId, draft: &TriggerDraft) -> Result<FireOutcome> {
        let (endpoint, payload) = match draft.validate()? {
            TriggerSpec::Api { endpoint, payload } => (endpoint, payload),
            spec => return Err(wrong_type(TriggerType::Api, &spec)),
        };
        let outcome = self.caller.post_json(&endpoint, &payload).await;
        let event = self
            .log_event(NewEventLog {
                trigger_id: None,
                user_id: user_id.clone(),
                response: Some(outcome.to_response()),
                status: EventStatus::Test,
                created_at: Utc::now(),
            })
            .await?;
        info!(user_id = %user_id, event_id = %event.id, failed = outcome.is_failure(), "test api trigger fired");
        Ok(FireOutcome::Logged {
            event_id: event.id,
            next_due: None,
        })
    }

    /// Write one event log, then drop the owner's cached pages. A cache
    /// failure is logged and leaves the write in place.
    async fn log_event(&self, new: NewEventLog) -> Result<EventLog> {
        let event = self.store.create_event_log(&new).await?;
        debug!(event_id = %event.id, status = %event.status, "event logged");

        if let Err(e) = self.invalidator.invalidate_user(&event.user_id).await {
            warn!(user_id = %event.user_id, "cache invalidation failed: {e}");
        }
        Ok(event)
    }
}

fn wrong_type(expected: TriggerType, spec: &TriggerSpec) -> SchedulerError {
    SchedulerError::InvalidRequest(format!(
        "expected a {expected} trigger, got {}",
        spec.trigger_type()
    ))
}
