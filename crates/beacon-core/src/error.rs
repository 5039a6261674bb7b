use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Trigger not found: {id}")]
    TriggerNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Upstream call failed: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BeaconError {
    /// Short, stable error code for a request layer to hand back to clients.
    pub fn code(&self) -> &'static str {
        match self {
            BeaconError::Config(_) => "CONFIG_ERROR",
            BeaconError::InvalidTrigger(_) => "INVALID_TRIGGER",
            BeaconError::InvalidRequest(_) => "INVALID_REQUEST",
            BeaconError::TriggerNotFound { .. } => "TRIGGER_NOT_FOUND",
            BeaconError::Database(_) => "DATABASE_ERROR",
            BeaconError::Cache(_) => "CACHE_ERROR",
            BeaconError::Queue(_) => "QUEUE_ERROR",
            BeaconError::Upstream(_) => "UPSTREAM_ERROR",
            BeaconError::Serialization(_) => "SERIALIZATION_ERROR",
            BeaconError::Io(_) => "IO_ERROR",
            BeaconError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BeaconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            BeaconError::InvalidTrigger("x".into()).code(),
            "INVALID_TRIGGER"
        );
        assert_eq!(
            BeaconError::TriggerNotFound { id: "3".into() }.code(),
            "TRIGGER_NOT_FOUND"
        );
        assert_eq!(
            BeaconError::InvalidRequest("bad status".into()).code(),
            "INVALID_REQUEST"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = BeaconError::Config("missing database.path".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing database.path"
        );
    }
}
