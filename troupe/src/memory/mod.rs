//! Memory subsystem: short-term, long-term, entity, and user stores behind
//! one interface, with quality-scored promotion from short- to long-term.
//!
//! Backends implement [`MemoryStore`]; the [`Memory`] facade adds quality
//! scoring, metadata conventions (entities are long-term records with
//! `category = "entity"`, user memories carry `user_id`), promotion, and
//! task-context building. Backend failures degrade the call: stores and
//! searches return empty and log, the run continues.
//!
//! | Backend | Persistence | Search |
//! |---------|-------------|--------|
//! | [`SqliteMemoryStore`] | SQLite file | substring (`LIKE`) |
//! | [`InMemoryMemoryStore`] | none | substring |
//! | [`VectorMemoryStore`] | none | cosine distance via [`Embedder`] |
//! | [`CachedMemoryStore`] | per primary | primary's |

mod cached_store;
mod embedder;
mod in_memory_store;
mod sqlite_store;
mod store;
mod vector_store;

pub use cached_store::CachedMemoryStore;
pub use embedder::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use in_memory_store::InMemoryMemoryStore;
pub use sqlite_store::SqliteMemoryStore;
pub use store::{now_epoch, MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore};
pub use vector_store::VectorMemoryStore;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::llm::{ChatRequest, LlmClient};
use crate::message::Message;

/// Default promotion threshold: short-term records at or above it are also
/// stored long-term.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Snippet length used when building task context.
const CONTEXT_SNIPPET_CHARS: usize = 150;

/// The four quality sub-metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub relevance: f64,
    pub clarity: f64,
    pub accuracy: f64,
}

impl QualityMetrics {
    /// Weighted composite, rounded to three decimals. Default weights are
    /// 0.25 each.
    pub fn composite(&self, weights: Option<[f64; 4]>) -> f64 {
        let [wc, wr, wl, wa] = weights.unwrap_or([0.25; 4]);
        let total = self.completeness * wc + self.relevance * wr + self.clarity * wl + self.accuracy * wa;
        (total * 1000.0).round() / 1000.0
    }
}

/// Quality input accompanying a store operation.
#[derive(Debug, Clone, Copy, Default)]
pub enum Quality {
    /// No quality metadata stored.
    #[default]
    Unscored,
    /// Sub-metrics; the composite lands in `metadata.quality`.
    Metrics(QualityMetrics),
    /// Pre-computed score, stored verbatim.
    Evaluator(f64),
}

/// Backend selection for [`Memory::new`].
#[derive(Clone, Default)]
pub struct MemoryConfig {
    /// `"sqlite"` (default), `"memory"`, or `"vector"`.
    pub provider: String,
    /// Database path for the sqlite provider; default `./.troupe/memory.db`.
    pub path: Option<PathBuf>,
    /// Required for the vector provider.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Front the chosen backend with an in-memory read cache.
    pub cached: bool,
}

/// Composite of short-term, long-term, entity, and user memory.
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn MemoryStore>,
    judge: Option<(Arc<dyn LlmClient>, String)>,
    threshold: f64,
    /// Run identity stamped into every stored record's metadata.
    run_id: Option<String>,
    user_id: Option<String>,
}

impl Memory {
    /// Builds a memory from a backend config.
    pub fn new(config: MemoryConfig) -> Result<Self, RuntimeError> {
        let primary: Arc<dyn MemoryStore> = match config.provider.as_str() {
            "" | "sqlite" => {
                let path = config
                    .path
                    .unwrap_or_else(|| PathBuf::from("./.troupe/memory.db"));
                Arc::new(
                    SqliteMemoryStore::new(path)
                        .map_err(|e| RuntimeError::Config(format!("memory backend: {}", e)))?,
                )
            }
            "memory" => Arc::new(InMemoryMemoryStore::new()),
            "vector" => {
                let embedder = config.embedder.clone().ok_or_else(|| {
                    RuntimeError::Config("vector memory provider requires an embedder".into())
                })?;
                Arc::new(VectorMemoryStore::new(embedder))
            }
            other => {
                return Err(RuntimeError::Config(format!(
                    "unknown memory provider: {}",
                    other
                )))
            }
        };
        let store: Arc<dyn MemoryStore> = if config.cached {
            Arc::new(CachedMemoryStore::new(
                primary,
                Arc::new(InMemoryMemoryStore::new()),
            ))
        } else {
            primary
        };
        Ok(Self::with_store(store))
    }

    /// Wraps an existing backend.
    pub fn with_store(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            judge: None,
            threshold: DEFAULT_QUALITY_THRESHOLD,
            run_id: None,
            user_id: None,
        }
    }

    /// Stamps the run identity carried in stored metadata. The orchestrator
    /// calls this at run entry.
    pub fn set_run_identity(&mut self, run_id: impl Into<String>, user_id: impl Into<String>) {
        self.run_id = Some(run_id.into());
        self.user_id = Some(user_id.into());
    }

    /// Attaches the judge used by [`Memory::calculate_quality_metrics`].
    pub fn with_judge(mut self, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        self.judge = Some((llm, model.into()));
        self
    }

    /// Overrides the promotion threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Run identity lands in metadata unless the caller already set it.
    fn apply_identity(&self, metadata: &mut Map<String, Value>) {
        if let Some(run_id) = &self.run_id {
            metadata.entry("run_id".to_string()).or_insert_with(|| json!(run_id));
        }
        if let Some(user_id) = &self.user_id {
            metadata.entry("user_id".to_string()).or_insert_with(|| json!(user_id));
        }
    }

    fn apply_quality(metadata: &mut Map<String, Value>, quality: Quality) {
        match quality {
            Quality::Unscored => {}
            Quality::Metrics(metrics) => {
                metadata.insert("completeness".into(), json!(metrics.completeness));
                metadata.insert("relevance".into(), json!(metrics.relevance));
                metadata.insert("clarity".into(), json!(metrics.clarity));
                metadata.insert("accuracy".into(), json!(metrics.accuracy));
                metadata.insert("quality".into(), json!(metrics.composite(None)));
            }
            Quality::Evaluator(score) => {
                metadata.insert("quality".into(), json!(score));
            }
        }
    }

    async fn store_degraded(&self, scope: MemoryScope, record: MemoryRecord) {
        if let Err(e) = self.store.put(scope, record).await {
            warn!(scope = ?scope, error = %e, "memory store failed, continuing");
        }
    }

    async fn search_degraded(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        cutoff: f32,
    ) -> Vec<MemoryHit> {
        match self.store.search(scope, query, limit, cutoff).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(scope = ?scope, error = %e, "memory search failed, returning empty");
                Vec::new()
            }
        }
    }

    /// Stores a short-term record.
    pub async fn store_short_term(
        &self,
        text: impl Into<String>,
        mut metadata: Map<String, Value>,
        quality: Quality,
    ) {
        Self::apply_quality(&mut metadata, quality);
        self.apply_identity(&mut metadata);
        self.store_degraded(MemoryScope::ShortTerm, MemoryRecord::new(text, metadata))
            .await;
    }

    /// Stores a long-term record.
    pub async fn store_long_term(
        &self,
        text: impl Into<String>,
        mut metadata: Map<String, Value>,
        quality: Quality,
    ) {
        Self::apply_quality(&mut metadata, quality);
        self.apply_identity(&mut metadata);
        self.store_degraded(MemoryScope::LongTerm, MemoryRecord::new(text, metadata))
            .await;
    }

    pub async fn search_short_term(
        &self,
        query: &str,
        limit: usize,
        relevance_cutoff: f32,
    ) -> Vec<MemoryHit> {
        self.search_degraded(MemoryScope::ShortTerm, query, limit, relevance_cutoff)
            .await
    }

    /// Long-term search with an optional quality floor.
    pub async fn search_long_term(
        &self,
        query: &str,
        limit: usize,
        relevance_cutoff: f32,
        min_quality: f64,
    ) -> Vec<MemoryHit> {
        let mut hits = self
            .search_degraded(MemoryScope::LongTerm, query, limit, relevance_cutoff)
            .await;
        if min_quality > 0.0 {
            hits.retain(|h| h.record.metric("quality").unwrap_or(0.0) >= min_quality);
        }
        hits
    }

    /// Stores an entity as a long-term record with `category = "entity"`.
    pub async fn store_entity(&self, name: &str, entity_type: &str, desc: &str, relations: &str) {
        let text = format!("{}({}): {} | relations: {}", name, entity_type, desc, relations);
        let mut metadata = Map::new();
        metadata.insert("category".into(), json!("entity"));
        metadata.insert("entity_name".into(), json!(name));
        metadata.insert("entity_type".into(), json!(entity_type));
        self.store_long_term(text, metadata, Quality::Unscored).await;
    }

    pub async fn search_entity(&self, query: &str, limit: usize) -> Vec<MemoryHit> {
        let mut hits = self
            .search_degraded(MemoryScope::LongTerm, query, limit.saturating_mul(4), 0.0)
            .await;
        hits.retain(|h| h.record.tag("category") == Some("entity"));
        hits.truncate(limit);
        hits
    }

    /// Stores a user-scoped record (short-term, `user_id` in metadata).
    pub async fn store_user_memory(
        &self,
        user_id: &str,
        text: impl Into<String>,
        extra: Option<Map<String, Value>>,
    ) {
        let mut metadata = extra.unwrap_or_default();
        metadata.insert("user_id".into(), json!(user_id));
        self.store_short_term(text, metadata, Quality::Unscored).await;
    }

    pub async fn search_user_memory(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryHit> {
        let mut hits = self
            .search_degraded(MemoryScope::ShortTerm, query, limit.saturating_mul(4), 0.0)
            .await;
        hits.retain(|h| h.record.tag("user_id") == Some(user_id));
        hits.truncate(limit);
        hits
    }

    /// Finalizes one task output: always stored short-term; also stored
    /// long-term iff `quality_score ≥ threshold` (default: the memory's own
    /// threshold).
    pub async fn finalize_task_output(
        &self,
        content: &str,
        agent_name: &str,
        quality_score: f64,
        threshold: Option<f64>,
    ) {
        let threshold = threshold.unwrap_or(self.threshold);
        let mut metadata = Map::new();
        metadata.insert("agent_name".into(), json!(agent_name));
        metadata.insert("score".into(), json!(quality_score));
        self.store_short_term(content, metadata.clone(), Quality::Evaluator(quality_score))
            .await;
        if quality_score >= threshold {
            debug!(agent = agent_name, quality = quality_score, "promoting output to long-term");
            self.store_long_term(content, metadata, Quality::Evaluator(quality_score))
                .await;
        }
    }

    /// Asks the judge model to score the four sub-metrics in [0, 1].
    /// Returns all zeros when no judge is configured or the call fails.
    pub async fn calculate_quality_metrics(
        &self,
        output: &str,
        expected_output: &str,
    ) -> QualityMetrics {
        let Some((llm, model)) = &self.judge else {
            return QualityMetrics::default();
        };
        let prompt = format!(
            "Evaluate the following task output against the expectation.\n\
             Expected Output: {}\n\nActual Output: {}\n\n\
             Score completeness, relevance, clarity, and accuracy each as a \
             float between 0 and 1.",
            expected_output, output
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "completeness": {"type": "number"},
                "relevance": {"type": "number"},
                "clarity": {"type": "number"},
                "accuracy": {"type": "number"}
            },
            "required": ["completeness", "relevance", "clarity", "accuracy"]
        });
        let request = ChatRequest::new(model.clone(), vec![Message::user(prompt)]);
        match llm.structured(&request, &schema).await {
            Ok(value) => {
                let metric = |k: &str| value.get(k).and_then(Value::as_f64).unwrap_or(0.0).clamp(0.0, 1.0);
                QualityMetrics {
                    completeness: metric("completeness"),
                    relevance: metric("relevance"),
                    clarity: metric("clarity"),
                    accuracy: metric("accuracy"),
                }
            }
            Err(e) => {
                warn!(error = %e, "quality metrics call failed, scoring zeros");
                QualityMetrics::default()
            }
        }
    }

    /// Builds the memory context string for a task prompt.
    ///
    /// Concatenates short-term, long-term, entity, and user snippets under
    /// section headers, each snippet truncated to 150 chars; empty sections
    /// are omitted and an empty result means no section had hits.
    pub async fn build_context_for_task(
        &self,
        task_description: &str,
        user_id: Option<&str>,
        additional: Option<&str>,
        max_items: usize,
    ) -> String {
        let query = match additional {
            Some(extra) if !extra.trim().is_empty() => {
                format!("{} {}", task_description, extra)
            }
            _ => task_description.to_string(),
        };

        let mut lines: Vec<String> = Vec::new();
        let snippet = |text: &str| text.chars().take(CONTEXT_SNIPPET_CHARS).collect::<String>();

        let short = self.search_short_term(&query, max_items, 0.0).await;
        if !short.is_empty() {
            lines.push("ShortTerm context:".into());
            for hit in &short {
                lines.push(format!("  - {}", snippet(&hit.record.content)));
            }
        }

        let long = self.search_long_term(&query, max_items, 0.0, 0.0).await;
        if !long.is_empty() {
            lines.push("LongTerm context:".into());
            for hit in &long {
                lines.push(format!("  - {}", snippet(&hit.record.content)));
            }
        }

        let entities = self.search_entity(&query, max_items).await;
        if !entities.is_empty() {
            lines.push("Entities found:".into());
            for hit in &entities {
                lines.push(format!("  - {}", snippet(&hit.record.content)));
            }
        }

        if let Some(user_id) = user_id {
            let user = self.search_user_memory(user_id, &query, max_items).await;
            if !user.is_empty() {
                lines.push(format!("User {} context:", user_id));
                for hit in &user {
                    lines.push(format!("  - {}", snippet(&hit.record.content)));
                }
            }
        }

        lines.join("\n")
    }

    pub async fn reset_short_term(&self) {
        if let Err(e) = self.store.reset(MemoryScope::ShortTerm).await {
            warn!(error = %e, "short-term reset failed");
        }
    }

    pub async fn reset_long_term(&self) {
        if let Err(e) = self.store.reset(MemoryScope::LongTerm).await {
            warn!(error = %e, "long-term reset failed");
        }
    }

    pub async fn reset_all(&self) {
        self.reset_short_term().await;
        self.reset_long_term().await;
    }
}
