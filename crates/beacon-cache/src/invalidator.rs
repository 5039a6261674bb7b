use std::sync::Arc;

use beacon_core::{config::DEFAULT_SCAN_COUNT, UserId};
use tracing::debug;

use crate::{error::Result, Cache};

/// Glob matching every cached event page of `user_id`.
pub fn user_events_pattern(user_id: &UserId) -> String {
    format!("events:{user_id}:*")
}

/// Deletes cached read pages after writes.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn Cache>,
    scan_count: usize,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    /// Drop every `events:<user_id>:*` key.
    pub async fn invalidate_user(&self, user_id: &UserId) -> Result<u64> {
        let removed = self.delete_matching(&user_events_pattern(user_id)).await?;
        debug!(user_id = %user_id, removed, "invalidated cached event pages");
        Ok(removed)
    }

    /// Walk the keyspace with SCAN and delete each non-empty batch until the
    /// cursor wraps back to zero.
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let (next, keys) = self.cache.scan(cursor, pattern, self.scan_count).await?;
            if !keys.is_empty() {
                removed += self.cache.delete(&keys).await?;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCache;

    #[tokio::test]
    async fn removes_only_the_owners_pages() {
        let cache = Arc::new(MemoryCache::new());
        for page in 1..=250 {
            cache
                .set(&format!("events:alice:active:page:{page}:per:10"), "[]", 600)
                .await
                .unwrap();
        }
        cache.set("events:alicia:active:page:1:per:10", "[]", 600).await.unwrap();
        cache.set("events:bob:archived:page:1:per:10", "[]", 600).await.unwrap();

        let invalidator = CacheInvalidator::new(cache.clone()).with_scan_count(100);
        let removed = invalidator
            .invalidate_user(&UserId::from("alice"))
            .await
            .unwrap();

        assert_eq!(removed, 250);
        assert_eq!(cache.len(), 2);
        assert!(cache
            .get("events:bob:archived:page:1:per:10")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn nothing_cached_is_a_no_op() {
        let invalidator = CacheInvalidator::new(Arc::new(MemoryCache::new()));
        assert_eq!(
            invalidator.invalidate_user(&UserId::from("x")).await.unwrap(),
            0
        );
    }
}
