use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

impl From<CacheError> for beacon_core::BeaconError {
    fn from(e: CacheError) -> Self {
        beacon_core::BeaconError::Cache(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_surface_as_cache_errors() {
        let err: beacon_core::BeaconError = CacheError::Backend("connection refused".into()).into();
        assert_eq!(err.code(), "CACHE_ERROR");
        assert!(err.to_string().contains("connection refused"));
    }
}
