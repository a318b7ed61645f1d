//! System prompt construction
//!
//! A [`PromptFormatter`] turns the question, schema context, conversation
//! history and an optional few-shot store into a system prompt. The few-shot
//! section is left out entirely when there are no examples.

mod sql;
mod viz;

pub use sql::{SqlPromptFormatter, DEFAULT_SQL_TEMPLATE};
pub use viz::{VizPromptFormatter, DEFAULT_VIZ_TEMPLATE};

use async_trait::async_trait;
use datachat_core::{ContextSnippet, FewShotExample, Message, VectorStore};
use tracing::{debug, warn};

/// Everything a formatter may draw on
#[derive(Clone, Copy)]
pub struct PromptRequest<'a> {
    pub question: &'a str,
    pub context: &'a [ContextSnippet],
    pub history: &'a [Message],
    pub few_shot: Option<&'a dyn VectorStore>,
}

impl<'a> PromptRequest<'a> {
    pub fn new(question: &'a str) -> Self {
        Self {
            question,
            context: &[],
            history: &[],
            few_shot: None,
        }
    }

    pub fn with_context(mut self, context: &'a [ContextSnippet]) -> Self {
        self.context = context;
        self
    }

    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }

    pub fn with_few_shot(mut self, store: Option<&'a dyn VectorStore>) -> Self {
        self.few_shot = store;
        self
    }
}

/// Builds an agent's system prompt
#[async_trait]
pub trait PromptFormatter: Send + Sync {
    async fn format(&self, request: PromptRequest<'_>) -> datachat_core::Result<String>;
}

/// Fetch up to `top_k` examples similar to `question`.
///
/// A failing store yields no examples.
pub(crate) async fn retrieve_examples(
    store: Option<&dyn VectorStore>,
    question: &str,
    top_k: usize,
) -> Vec<FewShotExample> {
    let Some(store) = store else {
        return Vec::new();
    };
    if top_k == 0 {
        return Vec::new();
    }

    match store.similarity_search(question, top_k).await {
        Ok(examples) => {
            debug!("Retrieved {} few-shot examples", examples.len());
            examples
        }
        Err(e) => {
            warn!("Few-shot retrieval failed, continuing without examples: {}", e);
            Vec::new()
        }
    }
}

/// Append a markdown section unless `body` is empty
pub(crate) fn push_section(prompt: &mut String, heading: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    prompt.push_str("\n\n## ");
    prompt.push_str(heading);
    prompt.push_str("\n\n");
    prompt.push_str(body.trim_end());
}
