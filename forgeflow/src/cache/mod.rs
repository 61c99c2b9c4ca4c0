//! Run caching.
//!
//! A [`CachedPipeline`] consults a [`RunCache`] before running the
//! pipeline and stores successful runs afterwards. Entries are keyed by a
//! [`CacheKey`] derived from the request text and a caller-supplied context
//! object, so the same request asked under different contexts is cached
//! separately.

mod memory;

pub use memory::InMemoryRunCache;

use crate::cancellation::CancellationToken;
use crate::core::WorkflowRun;
use crate::pipeline::StagePipeline;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Content-addressed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from the request and its context.
    ///
    /// The request is trimmed; the context is rendered as JSON with object
    /// keys in sorted order before hashing.
    #[must_use]
    pub fn new(task: &str, context: &Value) -> Self {
        let canonical = serde_json::to_string(context).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(task.trim().as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical.as_bytes());
        Self(format!("run:{}", hex::encode(hasher.finalize())))
    }

    /// The key as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored run.
    pub run: WorkflowRun,
    /// When it was stored.
    pub cached_at: DateTime<Utc>,
    /// When it stops being served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns true once `expires_at` has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned an entry.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0 when there were none.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage for completed runs.
#[async_trait]
pub trait RunCache: Send + Sync {
    /// Looks up a run.
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Stores a run.
    async fn set(&self, key: CacheKey, run: WorkflowRun);

    /// Removes every entry.
    async fn clear(&self);

    /// Lookup counters.
    fn stats(&self) -> CacheStats;
}

/// A run answered by [`CachedPipeline`].
#[derive(Debug, Clone)]
pub struct CachedRun {
    /// The run, fresh or cached.
    pub run: WorkflowRun,
    /// Whether it came from the cache.
    pub from_cache: bool,
}

/// Wraps a pipeline with a run cache.
#[derive(Clone)]
pub struct CachedPipeline {
    pipeline: StagePipeline,
    cache: Arc<dyn RunCache>,
    enabled: bool,
}

impl fmt::Debug for CachedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPipeline")
            .field("pipeline", &self.pipeline)
            .field("enabled", &self.enabled)
            .field("stats", &self.cache.stats())
            .finish()
    }
}

impl CachedPipeline {
    /// Wraps `pipeline` with `cache`.
    #[must_use]
    pub fn new(pipeline: StagePipeline, cache: Arc<dyn RunCache>) -> Self {
        Self {
            pipeline,
            cache,
            enabled: true,
        }
    }

    /// Turns caching on or off. A disabled wrapper always runs the pipeline.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns a cached run for `task` under `context`, or runs the pipeline.
    pub async fn run(&self, task: &str, context: &Value) -> CachedRun {
        self.run_with_cancellation(task, context, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), with caller cancellation.
    ///
    /// Only successful runs are stored.
    pub async fn run_with_cancellation(
        &self,
        task: &str,
        context: &Value,
        cancel: &CancellationToken,
    ) -> CachedRun {
        if !self.enabled {
            return CachedRun {
                run: self.pipeline.run_with_cancellation(task, cancel).await,
                from_cache: false,
            };
        }

        let key = CacheKey::new(task, context);
        if let Some(entry) = self.cache.get(&key).await {
            info!(key = %key, cached_at = %entry.cached_at, "Cache hit");
            return CachedRun {
                run: entry.run,
                from_cache: true,
            };
        }

        debug!(key = %key, "Cache miss, running pipeline");
        let run = self.pipeline.run_with_cancellation(task, cancel).await;
        if run.success {
            self.cache.set(key, run.clone()).await;
        } else {
            debug!(run_id = %run.run_id, "Run not cached, it did not succeed");
        }
        CachedRun {
            run,
            from_cache: false,
        }
    }
}
