use beacon_core::{
    config::{ARCHIVE_QUEUE, TRIGGER_QUEUE},
    TriggerId, UserId,
};
use beacon_store::TriggerDraft;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The named queues workers consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// Trigger firings, real and test.
    Trigger,
    /// The archival sweeper.
    Archive,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Trigger, QueueName::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Trigger => TRIGGER_QUEUE,
            QueueName::Archive => ARCHIVE_QUEUE,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            TRIGGER_QUEUE => Ok(QueueName::Trigger),
            ARCHIVE_QUEUE => Ok(QueueName::Archive),
            other => Err(format!("unknown queue: {other}")),
        }
    }
}

/// Arguments of one scheduled firing.
///
/// `due_at` is the instant this firing was scheduled for; day-recurring
/// triggers advance from it rather than from the wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFire {
    pub trigger_id: TriggerId,
    pub recurrence: bool,
    pub due_at: DateTime<Utc>,
    pub generation: u32,
}

/// What a delayed job does when it comes due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", content = "args", rename_all = "snake_case")]
pub enum JobCall {
    FireScheduled(ScheduledFire),
    /// Dry run of a draft that was never persisted.
    FireTestScheduled {
        user_id: UserId,
        draft: TriggerDraft,
    },
    Sweep,
}

impl JobCall {
    /// Stable call identifier, used in logs and spans.
    pub fn name(&self) -> &'static str {
        match self {
            JobCall::FireScheduled(_) => "fire_scheduled",
            JobCall::FireTestScheduled { .. } => "fire_test_scheduled",
            JobCall::Sweep => "sweep",
        }
    }
}

/// A persisted delayed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub queue: QueueName,
    pub due_at: DateTime<Utc>,
    pub call: JobCall,
    pub enqueued_at: DateTime<Utc>,
}
