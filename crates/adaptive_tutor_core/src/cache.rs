//! crates/adaptive_tutor_core/src/cache.rs
//!
//! Maps a training material to a reusable AI-side context handle.
//!
//! Entries live in the persistence layer keyed by the material's content hash.
//! Expired entries are invalidated lazily, on the next lookup. Creation is
//! single-flight per hash: concurrent callers for the same material wait on one
//! submission and all receive its handle.

use crate::config::PipelineConfig;
use crate::domain::{CacheEntry, TrainingMaterial};
use crate::error::PipelineError;
use crate::locks::KeyedLocks;
use crate::ports::{DatabaseService, GenerativeAiService, MaterialContext, PortError};
use crate::rate_limit::RateLimiter;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct CacheManager {
    db: Arc<dyn DatabaseService>,
    ai: Arc<dyn GenerativeAiService>,
    limiter: Arc<RateLimiter>,
    ttl_hours: u32,
    creation_locks: KeyedLocks<String>,
}

impl CacheManager {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        ai: Arc<dyn GenerativeAiService>,
        limiter: Arc<RateLimiter>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            ai,
            limiter,
            ttl_hours: config.effective_cache_ttl_hours(),
            creation_locks: KeyedLocks::new(),
        }
    }

    /// Returns a live cache entry for `material`, submitting it to the backend on a miss.
    pub async fn acquire(&self, material: &TrainingMaterial) -> Result<CacheEntry, PipelineError> {
        let hash = &material.content_hash;
        if let Some(entry) = self.live_entry(hash).await? {
            return Ok(entry);
        }

        let _creating = self.creation_locks.lock(hash.clone()).await;

        // Another caller may have created it while we waited.
        if let Some(entry) = self.live_entry(hash).await? {
            return Ok(entry);
        }

        self.limiter
            .acquire()
            .await
            .map_err(|e| PipelineError::CacheUnavailable(e.to_string()))?;

        let ttl = Duration::from_secs(u64::from(self.ttl_hours) * 3600);
        let handle = self
            .ai
            .create_cached_context(material, ttl)
            .await
            .map_err(|e| PipelineError::CacheUnavailable(e.to_string()))?;

        let entry = CacheEntry::new(hash.clone(), handle, Utc::now(), self.ttl_hours);
        self.db
            .upsert_cache_entry(&entry)
            .await
            .map_err(|e| PipelineError::CacheUnavailable(e.to_string()))?;
        info!(
            "Cached material {} (hash {}) until {}",
            material.id, entry.material_hash, entry.expires_at
        );
        Ok(entry)
    }

    /// The context to use for a call: the cached handle, or the raw material when caching fails.
    pub async fn context_for(&self, material: &Arc<TrainingMaterial>) -> MaterialContext {
        match self.acquire(material).await {
            Ok(entry) => MaterialContext::Cached {
                handle: entry.provider_handle,
                material_hash: entry.material_hash,
            },
            Err(e) => {
                warn!(
                    "Falling back to uncached calls for material {}: {}",
                    material.id, e
                );
                MaterialContext::Inline(material.clone())
            }
        }
    }

    /// Drops the entry for `material_hash` if it still holds `stale_handle`.
    /// A newer handle stored by another caller is left alone.
    pub async fn invalidate(&self, material_hash: &str, stale_handle: &str) -> Result<bool, PipelineError> {
        Ok(self.db.delete_cache_entry(material_hash, stale_handle).await?)
    }

    /// Runs `call` with the material's context. If the backend no longer knows the
    /// cached handle, the entry is dropped, a fresh context acquired, and the call retried once.
    pub async fn run_with_context<T, F, Fut>(
        &self,
        material: &Arc<TrainingMaterial>,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: Fn(MaterialContext) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let context = self.context_for(material).await;
        let used_handle = match &context {
            MaterialContext::Cached { handle, .. } => Some(handle.clone()),
            MaterialContext::Inline(_) => None,
        };
        match (call(context).await, used_handle) {
            (Err(PipelineError::Port(PortError::ContextExpired(reason))), Some(stale)) => {
                warn!(
                    "Context for material {} expired on the backend ({}), re-acquiring",
                    material.id, reason
                );
                self.invalidate(&material.content_hash, &stale).await?;
                let context = self.context_for(material).await;
                call(context).await
            }
            (other, _) => other,
        }
    }

    async fn live_entry(&self, hash: &str) -> Result<Option<CacheEntry>, PipelineError> {
        let entry = self
            .db
            .get_cache_entry(hash)
            .await
            .map_err(|e| PipelineError::CacheUnavailable(e.to_string()))?;
        match entry {
            Some(entry) if entry.is_live(Utc::now()) => Ok(Some(entry)),
            Some(expired) => {
                info!("Cache entry for hash {} expired at {}", hash, expired.expires_at);
                self.db
                    .delete_cache_entry(hash, &expired.provider_handle)
                    .await
                    .map_err(|e| PipelineError::CacheUnavailable(e.to_string()))?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
