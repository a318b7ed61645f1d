//! Few-shot example retrieval
//!
//! Examples are (question, artifact) pairs ranked by similarity to the
//! user's question. The artifact is a SQL query for the SQL agent and a
//! chart recommendation for the visualization agent.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use memory::InMemoryVectorStore;

/// A prior question with its known-good artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub question: String,
    pub artifact: String,
    /// Similarity to the search query, when returned by a search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl FewShotExample {
    pub fn new(question: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            artifact: artifact.into(),
            score: None,
        }
    }
}

/// Read-only similarity index over few-shot examples
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` examples, most similar first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<FewShotExample>>;
}
