//! Knowledge search contract.
//!
//! Knowledge-base ingestion (parsing, chunking, indexing) happens outside
//! this crate; agents and tasks only consume the post-ingestion surface:
//! `search(query, scope) → snippets`. The scope carries the agent and user
//! identity so backends can filter per-agent or per-user collections.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RuntimeError;

/// One retrieved snippet.
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub text: String,
    /// Relevance score when the backend provides one.
    pub score: Option<f32>,
    pub metadata: Value,
}

impl KnowledgeHit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
            metadata: Value::Null,
        }
    }
}

/// Query scope: which agent is asking, on behalf of which user.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeScope {
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
}

/// External knowledge backend: query in, snippets out.
#[async_trait]
pub trait Knowledge: Send + Sync {
    async fn search(
        &self,
        query: &str,
        scope: &KnowledgeScope,
    ) -> Result<Vec<KnowledgeHit>, RuntimeError>;
}

/// Fixed-snippet backend for tests and offline runs.
pub struct StaticKnowledge {
    hits: Vec<KnowledgeHit>,
}

impl StaticKnowledge {
    pub fn new(snippets: Vec<String>) -> Self {
        Self {
            hits: snippets.into_iter().map(KnowledgeHit::new).collect(),
        }
    }

    /// Backend that returns nothing, for exercising the no-hits path.
    pub fn empty() -> Self {
        Self { hits: Vec::new() }
    }
}

#[async_trait]
impl Knowledge for StaticKnowledge {
    async fn search(
        &self,
        _query: &str,
        _scope: &KnowledgeScope,
    ) -> Result<Vec<KnowledgeHit>, RuntimeError> {
        Ok(self.hits.clone())
    }
}
