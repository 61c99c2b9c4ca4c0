//! In-process run cache.

use super::{CacheEntry, CacheKey, CacheStats, RunCache};
use crate::core::WorkflowRun;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A [`RunCache`] backed by a concurrent map, with an optional TTL.
#[derive(Debug, Default)]
pub struct InMemoryRunCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryRunCache {
    /// Creates a cache whose entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RunCache for InMemoryRunCache {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self.entries.get(key).map(|e| e.value().clone());
        match found {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: CacheKey, run: WorkflowRun) {
        let cached_at = Utc::now();
        let expires_at = self
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| cached_at + ttl);
        self.entries.insert(
            key,
            CacheEntry {
                run,
                cached_at,
                expires_at,
            },
        );
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineState;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn run() -> WorkflowRun {
        WorkflowRun {
            run_id: Uuid::new_v4(),
            original_request: "task".to_string(),
            workflow_name: "test".to_string(),
            stages: Vec::new(),
            final_output: "fn main() {}".to_string(),
            iterations: 0,
            total_duration_seconds: 1.0,
            success: true,
            state: PipelineState::Done,
            abort_reason: None,
            skipped_stages: Vec::new(),
            hook_records: Vec::new(),
            gate_failures: Vec::new(),
            context: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryRunCache::new();
        let key = CacheKey::new("task", &json!({}));
        assert!(cache.get(&key).await.is_none());

        let stored = run();
        cache.set(key.clone(), stored.clone()).await;
        let entry = cache.get(&key).await.unwrap();

        assert_eq!(entry.run.run_id, stored.run_id);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = InMemoryRunCache::new().with_ttl(Duration::ZERO);
        let key = CacheKey::new("task", &json!({}));
        cache.set(key.clone(), run()).await;

        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = InMemoryRunCache::new();
        cache.set(CacheKey::new("a", &json!({})), run()).await;
        cache.set(CacheKey::new("b", &json!({})), run()).await;
        cache.clear().await;
        assert!(cache.is_empty());
    }
}
