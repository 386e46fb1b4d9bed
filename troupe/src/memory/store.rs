//! MemoryStore trait and record types.
//!
//! One trait covers every backend; records live in two scopes (short-term
//! and long-term) keyed by an opaque id. Entity and user memories are plain
//! records distinguished by metadata, so backends stay schema-free. Callers
//! do not depend on backend error types: messages are flattened into
//! [`MemoryError`].

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Which store a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryScope {
    ShortTerm,
    LongTerm,
}

impl MemoryScope {
    /// SQL table name for the scope.
    pub fn table(&self) -> &'static str {
        match self {
            MemoryScope::ShortTerm => "short_mem",
            MemoryScope::LongTerm => "long_mem",
        }
    }
}

/// Error for store operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// JSON encode/decode of content or metadata failed.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Backend storage error (DB I/O). Message is opaque to avoid leaking
    /// backend types.
    #[error("storage: {0}")]
    Storage(String),

    /// Embedding generation failed.
    #[error("embedding: {0}")]
    Embedding(String),
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// One stored memory record.
///
/// Well-known metadata keys: `agent_name`, `task_id`, `user_id`, `category`,
/// `quality` plus the four sub-metrics. Timestamps are epoch seconds
/// (the `created_at REAL` column).
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub created_at: f64,
    pub updated_at: f64,
}

impl MemoryRecord {
    /// New record with a fresh id and current timestamps.
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let now = now_epoch();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Numeric metadata accessor (`quality`, sub-metrics).
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// String metadata accessor (`user_id`, `category`, ...).
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Current time as epoch seconds.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One search hit.
///
/// `score` is the cosine *distance* for embedding backends (lower is more
/// relevant); substring backends leave it `None`.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub record: MemoryRecord,
    pub score: Option<f32>,
}

/// Uniform read/write/search/delete over a scoped record space.
///
/// Search semantics per backend: embedding-backed stores keep a record iff
/// `distance ≤ 1 − relevance_cutoff`; the SQL and in-memory fallbacks match
/// by case-insensitive substring and ignore the cutoff.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn put(&self, scope: MemoryScope, record: MemoryRecord) -> Result<(), MemoryError>;

    async fn get(&self, scope: MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    async fn search(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        relevance_cutoff: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError>;

    async fn delete(&self, scope: MemoryScope, id: &str) -> Result<(), MemoryError>;

    /// Removes every record in the scope.
    async fn reset(&self, scope: MemoryScope) -> Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: new records get unique ids and matching timestamps.
    #[test]
    fn new_record_has_unique_id_and_timestamps() {
        let a = MemoryRecord::new("one", Map::new());
        let b = MemoryRecord::new("two", Map::new());
        assert_ne!(a.id, b.id);
        assert!(a.created_at > 0.0);
        assert_eq!(a.created_at, a.updated_at);
    }

    /// **Scenario**: metric/tag accessors read well-known metadata keys.
    #[test]
    fn metric_and_tag_accessors() {
        let mut meta = Map::new();
        meta.insert("quality".into(), json!(0.9));
        meta.insert("user_id".into(), json!("u1"));
        let record = MemoryRecord::new("text", meta);
        assert_eq!(record.metric("quality"), Some(0.9));
        assert_eq!(record.tag("user_id"), Some("u1"));
        assert_eq!(record.metric("missing"), None);
    }

    /// **Scenario**: scope maps to the mandated table names.
    #[test]
    fn scope_table_names() {
        assert_eq!(MemoryScope::ShortTerm.table(), "short_mem");
        assert_eq!(MemoryScope::LongTerm.table(), "long_mem");
    }
}
