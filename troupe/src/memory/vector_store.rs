//! Embedding-backed memory store with cosine-distance search.
//!
//! Records are embedded on write; a search embeds the query and keeps a
//! record iff `distance ≤ 1 − relevance_cutoff`, ascending by distance. The
//! index is in-memory; persistence belongs to the primary backend when this
//! store fronts one (see `CachedMemoryStore` for the composition pattern).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::embedder::Embedder;
use super::store::{MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore};

/// Vector index over an [`Embedder`].
pub struct VectorMemoryStore {
    embedder: Arc<dyn Embedder>,
    index: Mutex<HashMap<MemoryScope, Vec<(MemoryRecord, Vec<f32>)>>>,
}

impl VectorMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            index: Mutex::new(HashMap::new()),
        }
    }
}

/// Cosine distance in [0, 2]; orthogonal or zero-norm vectors score 1.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl MemoryStore for VectorMemoryStore {
    async fn put(&self, scope: MemoryScope, record: MemoryRecord) -> Result<(), MemoryError> {
        let vector = self.embedder.embed(&record.content).await?;
        let mut index = self.index.lock().await;
        let bucket = index.entry(scope).or_default();
        match bucket.iter_mut().find(|(r, _)| r.id == record.id) {
            Some(slot) => *slot = (record, vector),
            None => bucket.push((record, vector)),
        }
        Ok(())
    }

    async fn get(&self, scope: MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self
            .index
            .lock()
            .await
            .get(&scope)
            .and_then(|bucket| bucket.iter().find(|(r, _)| r.id == id))
            .map(|(r, _)| r.clone()))
    }

    async fn search(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        relevance_cutoff: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let query_vec = self.embedder.embed(query).await?;
        let max_distance = 1.0 - relevance_cutoff;
        let index = self.index.lock().await;
        let mut hits: Vec<MemoryHit> = index
            .get(&scope)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(record, vector)| MemoryHit {
                        record: record.clone(),
                        score: Some(cosine_distance(&query_vec, vector)),
                    })
                    .filter(|hit| hit.score.unwrap_or(1.0) <= max_distance)
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, scope: MemoryScope, id: &str) -> Result<(), MemoryError> {
        if let Some(bucket) = self.index.lock().await.get_mut(&scope) {
            bucket.retain(|(r, _)| r.id != id);
        }
        Ok(())
    }

    async fn reset(&self, scope: MemoryScope) -> Result<(), MemoryError> {
        self.index.lock().await.remove(&scope);
        Ok(())
    }
}
