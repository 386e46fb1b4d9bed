//! Read-through cache front over a primary memory store.
//!
//! Writes go to the primary and the cache; id reads consult the cache first
//! and populate it on miss. Searches always hit the primary — a substring or
//! vector query against a partially-populated cache would silently drop
//! results.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::store::{MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore};

/// Cache-fronted store. Cache failures degrade to the primary, never fail
/// the call.
pub struct CachedMemoryStore {
    primary: Arc<dyn MemoryStore>,
    cache: Arc<dyn MemoryStore>,
}

impl CachedMemoryStore {
    pub fn new(primary: Arc<dyn MemoryStore>, cache: Arc<dyn MemoryStore>) -> Self {
        Self { primary, cache }
    }
}

#[async_trait]
impl MemoryStore for CachedMemoryStore {
    async fn put(&self, scope: MemoryScope, record: MemoryRecord) -> Result<(), MemoryError> {
        self.primary.put(scope, record.clone()).await?;
        if let Err(e) = self.cache.put(scope, record).await {
            warn!(error = %e, "memory cache put failed");
        }
        Ok(())
    }

    async fn get(&self, scope: MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        match self.cache.get(scope, id).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "memory cache get failed"),
        }
        let record = self.primary.get(scope, id).await?;
        if let Some(record) = &record {
            if let Err(e) = self.cache.put(scope, record.clone()).await {
                warn!(error = %e, "memory cache backfill failed");
            }
        }
        Ok(record)
    }

    async fn search(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        relevance_cutoff: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        self.primary.search(scope, query, limit, relevance_cutoff).await
    }

    async fn delete(&self, scope: MemoryScope, id: &str) -> Result<(), MemoryError> {
        if let Err(e) = self.cache.delete(scope, id).await {
            warn!(error = %e, "memory cache delete failed");
        }
        self.primary.delete(scope, id).await
    }

    async fn reset(&self, scope: MemoryScope) -> Result<(), MemoryError> {
        if let Err(e) = self.cache.reset(scope).await {
            warn!(error = %e, "memory cache reset failed");
        }
        self.primary.reset(scope).await
    }
}
