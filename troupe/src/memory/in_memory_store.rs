//! In-memory memory store for dev and tests.
//!
//! Same observable semantics as the SQLite backend (case-insensitive
//! substring search, unscored), without persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::store::{MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore};

/// Map-backed store; cheap to construct per test.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: Mutex<HashMap<MemoryScope, Vec<MemoryRecord>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a scope (test helper).
    pub fn len(&self, scope: MemoryScope) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(&scope)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, scope: MemoryScope, record: MemoryRecord) -> Result<(), MemoryError> {
        let mut records = self.records.lock().unwrap();
        let bucket = records.entry(scope).or_default();
        match bucket.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => bucket.push(record),
        }
        Ok(())
    }

    async fn get(&self, scope: MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&scope)
            .and_then(|bucket| bucket.iter().find(|r| r.id == id).cloned()))
    }

    async fn search(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        _relevance_cutoff: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let needle = query.to_lowercase();
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&scope)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|r| r.content.to_lowercase().contains(&needle))
                    .take(limit)
                    .map(|r| MemoryHit {
                        record: r.clone(),
                        score: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, scope: MemoryScope, id: &str) -> Result<(), MemoryError> {
        if let Some(bucket) = self.records.lock().unwrap().get_mut(&scope) {
            bucket.retain(|r| r.id != id);
        }
        Ok(())
    }

    async fn reset(&self, scope: MemoryScope) -> Result<(), MemoryError> {
        self.records.lock().unwrap().remove(&scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    /// **Scenario**: put/search/delete/reset behave like the SQL backend.
    #[tokio::test]
    async fn store_roundtrip_and_case_insensitive_search() {
        let store = InMemoryMemoryStore::new();
        let rec = MemoryRecord::new("Prime Numbers", Map::new());
        let id = rec.id.clone();
        store.put(MemoryScope::ShortTerm, rec).await.unwrap();

        let hits = store
            .search(MemoryScope::ShortTerm, "prime", 10, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store
            .search(MemoryScope::LongTerm, "prime", 10, 0.0)
            .await
            .unwrap()
            .is_empty());

        store.delete(MemoryScope::ShortTerm, &id).await.unwrap();
        assert_eq!(store.len(MemoryScope::ShortTerm), 0);

        store
            .put(MemoryScope::ShortTerm, MemoryRecord::new("x", Map::new()))
            .await
            .unwrap();
        store.reset(MemoryScope::ShortTerm).await.unwrap();
        assert_eq!(store.len(MemoryScope::ShortTerm), 0);
    }

    /// **Scenario**: same-id put replaces instead of duplicating.
    #[tokio::test]
    async fn same_id_put_replaces() {
        let store = InMemoryMemoryStore::new();
        let mut rec = MemoryRecord::new("v1", Map::new());
        store.put(MemoryScope::LongTerm, rec.clone()).await.unwrap();
        rec.content = "v2".into();
        store.put(MemoryScope::LongTerm, rec.clone()).await.unwrap();
        assert_eq!(store.len(MemoryScope::LongTerm), 1);
        let loaded = store.get(MemoryScope::LongTerm, &rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "v2");
    }
}
