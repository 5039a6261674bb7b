use beacon_cache::CacheError;
use beacon_core::{BeaconError, TriggerId};
use beacon_store::{InvalidTrigger, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("queue database error: {0}")]
    Queue(#[from] rusqlite::Error),

    #[error("corrupt job {id}: {reason}")]
    CorruptJob { id: i64, reason: String },

    #[error("job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidTrigger(#[from] InvalidTrigger),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("trigger not found: {id}")]
    TriggerNotFound { id: TriggerId },

    #[error("upstream client error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for BeaconError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::InvalidTrigger(inner) => BeaconError::InvalidTrigger(inner.0),
            SchedulerError::InvalidRequest(msg) => BeaconError::InvalidRequest(msg),
            SchedulerError::TriggerNotFound { id } => BeaconError::TriggerNotFound {
                id: id.to_string(),
            },
            SchedulerError::Store(StoreError::NotFound { id, .. }) => {
                BeaconError::TriggerNotFound { id }
            }
            SchedulerError::Store(other) => BeaconError::Database(other.to_string()),
            SchedulerError::Cache(inner) => inner.into(),
            SchedulerError::Queue(inner) => BeaconError::Queue(inner.to_string()),
            e @ SchedulerError::CorruptJob { .. } => BeaconError::Queue(e.to_string()),
            SchedulerError::Serialization(inner) => BeaconError::Serialization(inner),
            SchedulerError::Upstream(msg) => BeaconError::Upstream(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_stable_codes() {
        let not_found: BeaconError = SchedulerError::TriggerNotFound { id: TriggerId(9) }.into();
        assert_eq!(not_found.code(), "TRIGGER_NOT_FOUND");

        let invalid: BeaconError =
            SchedulerError::InvalidTrigger(InvalidTrigger("interval must be positive".into()))
                .into();
        assert_eq!(invalid.code(), "INVALID_TRIGGER");
        assert!(invalid.to_string().contains("interval"));

        let bad_status: BeaconError =
            SchedulerError::InvalidRequest("invalid status, use 'active' or 'archived'".into())
                .into();
        assert_eq!(bad_status.code(), "INVALID_REQUEST");
    }
}
