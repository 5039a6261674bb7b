use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{error::Result, Cache};

/// In-process [`Cache`].
///
/// Keys are enumerated in insertion order. The scan cursor is the sequence
/// number of the last key examined, so deleting keys mid-scan never makes
/// the scan skip a live key.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

struct Entry {
    value: String,
    expires_at: Instant,
    seq: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner
            .entries
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let found = inner
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.value.clone()));
        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                inner.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value.to_string();
            entry.expires_at = expires_at;
            return Ok(());
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
                seq,
            },
        );
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let window: Vec<(u64, String)> = inner
            .order
            .range(cursor.saturating_add(1)..)
            .take(count.max(1))
            .map(|(seq, key)| (*seq, key.clone()))
            .collect();

        let mut keys = Vec::new();
        let mut expired = Vec::new();
        for (_, key) in &window {
            let live = inner
                .entries
                .get(key)
                .is_some_and(|entry| entry.expires_at > now);
            if !live {
                expired.push(key.clone());
            } else if glob_match(pattern, key) {
                keys.push(key.clone());
            }
        }
        for key in expired {
            inner.remove(&key);
        }

        let next = match window.last() {
            Some((last, _)) if inner.order.range(last + 1..).next().is_some() => *last,
            _ => 0,
        };
        Ok((next, keys))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let removed = keys.iter().filter(|key| inner.remove(key)).count();
        Ok(removed as u64)
    }
}

/// Redis-style glob: `*` matches any run, `?` one character, `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scan_all(cache: &MemoryCache, pattern: &str, count: usize) -> Vec<String> {
        let mut cursor = 0;
        let mut out = Vec::new();
        loop {
            let (next, keys) = cache.scan(cursor, pattern, count).await.unwrap();
            out.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        out
    }

    #[test]
    fn glob_basics() {
        assert!(glob_match("events:u1:*", "events:u1:active:page:1:per:10"));
        assert!(!glob_match("events:u1:*", "events:u10:active:page:1:per:10"));
        assert!(glob_match("events:u?:*", "events:u2:x"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match(r"literal\*", "literal*"));
        assert!(!glob_match(r"literal\*", "literalX"));
    }

    #[tokio::test]
    async fn get_set_delete() {
        let cache = MemoryCache::new();
        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.set("k", "v2", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));

        let n = cache
            .delete(&["k".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v", 600).await.unwrap();
        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(cache.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn scan_pages_through_every_match() {
        let cache = MemoryCache::new();
        for i in 0..25 {
            cache.set(&format!("events:u1:{i}"), "x", 60).await.unwrap();
            cache.set(&format!("events:u2:{i}"), "x", 60).await.unwrap();
        }
        let keys = scan_all(&cache, "events:u1:*", 7).await;
        assert_eq!(keys.len(), 25);
        assert!(keys.iter().all(|k| k.starts_with("events:u1:")));
    }

    #[tokio::test]
    async fn deleting_during_scan_skips_nothing() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache.set(&format!("k{i}"), "x", 60).await.unwrap();
        }
        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let (next, keys) = cache.scan(cursor, "k*", 3).await.unwrap();
            seen += keys.len();
            cache.delete(&keys).await.unwrap();
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen, 10);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn scan_of_empty_cache_finishes_immediately() {
        let cache = MemoryCache::new();
        let (cursor, keys) = cache.scan(0, "*", 100).await.unwrap();
        assert_eq!(cursor, 0);
        assert!(keys.is_empty());
    }
}
