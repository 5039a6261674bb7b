use thiserror::Error;

use crate::types::InvalidTrigger;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row could not be mapped back to a domain type.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error(transparent)]
    Invalid(#[from] InvalidTrigger),
}

pub type Result<T> = std::result::Result<T, StoreError>;
