//! `beacon-cache`: the read cache in front of per-user event log pages and
//! the invalidator that keeps it honest.
//!
//! Two backends implement [`Cache`]:
//! - `RedisCache`: shared across processes, behind the default `redis`
//!   feature. This is what deployments with separate worker processes use.
//! - [`MemoryCache`]: in-process only, for single-process setups and tests.

pub mod error;
pub mod invalidator;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use invalidator::{user_events_pattern, CacheInvalidator};
pub use memory::{glob_match, MemoryCache};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

/// Key/value store with per-key TTL and cursor-based key enumeration.
///
/// `scan` follows Redis SCAN semantics: start with cursor `0`, keep calling
/// with the returned cursor until it comes back as `0`. A batch may be empty
/// while the cursor is still non-zero.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;
}
