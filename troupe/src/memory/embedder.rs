//! Embedder contract for vector-backed memory search.
//!
//! Embeddings are produced outside the core; the vector store only needs
//! `embed(text) → Vec<f32>`. Ships with an OpenAI-compatible HTTP
//! implementation and a deterministic hash embedder for tests/offline runs.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::{resolve_model, split_model};

use super::store::MemoryError;

/// Text → embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Settings resolved from a provider-prefixed model string
    /// (e.g. `"openai/text-embedding-3-small"`).
    pub fn from_model(model: &str) -> Self {
        let settings = resolve_model(model);
        let (_, model) = split_model(model);
        Self {
            http: reqwest::Client::new(),
            api_key: settings.api_key,
            base_url: settings.base_url,
            model,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        debug!(url = %url, model = %self.model, chars = text.len(), "embedding request");
        let mut req = self.http.post(&url).json(&serde_json::json!({
            "model": self.model,
            "input": text,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| MemoryError::Embedding(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Embedding(format!("{}: {}", status, body)));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(format!("response parse failed: {}", e)))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| MemoryError::Embedding("empty embeddings response".into()))
    }
}

/// Deterministic bag-of-words embedder.
///
/// Hashes each lowercase word into a fixed-dimension bucket count vector.
/// Texts sharing words land near each other under cosine distance, which is
/// enough for store tests and offline runs; not a semantic model.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: 64 }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimension];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}
