use async_trait::async_trait;
use datachat_core::{Message, MessageKind};

use super::{push_section, retrieve_examples, PromptFormatter, PromptRequest};
use crate::tools::QUERY_TABLE_TOOL;

pub const DEFAULT_SQL_TEMPLATE: &str = r#"# Role

You are an expert data analyst. You answer questions by writing SQL queries against the tables described below and running them with the `query_table` tool.

# Instructions

1. Read the question and the dataset context carefully.
2. Write one syntactically correct query that retrieves exactly what is needed. Use fully qualified table names and only the columns listed in the context.
3. Call `query_table` with the query. If it fails, read the error, fix the query and try again.
4. Never modify data. Only SELECT statements are allowed.
5. If the question is ambiguous or the data needed is not in the context, do not call the tool. Reply with a short clarification question instead.
6. When you have the result, answer in the user's language. Be concise and mention the relevant figures."#;

/// Prompt formatter for the SQL agent
pub struct SqlPromptFormatter {
    template: String,
    top_k: usize,
}

impl SqlPromptFormatter {
    pub fn new(top_k: usize) -> Self {
        Self::with_template(DEFAULT_SQL_TEMPLATE, top_k)
    }

    pub fn with_template(template: impl Into<String>, top_k: usize) -> Self {
        Self {
            template: template.into(),
            top_k,
        }
    }
}

impl Default for SqlPromptFormatter {
    fn default() -> Self {
        Self::new(datachat_core::config::DEFAULT_FEW_SHOT_TOP_K)
    }
}

#[async_trait]
impl PromptFormatter for SqlPromptFormatter {
    async fn format(&self, request: PromptRequest<'_>) -> datachat_core::Result<String> {
        let mut prompt = self.template.trim_end().to_string();

        let context = request
            .context
            .iter()
            .map(|snippet| snippet.render())
            .collect::<Vec<_>>()
            .join("\n");
        push_section(&mut prompt, "Dataset context", &context);

        let examples = retrieve_examples(request.few_shot, request.question, self.top_k).await;
        let examples = examples
            .iter()
            .map(|ex| format!("Question: {}\nSQL Query:\n```sql\n{}\n```", ex.question, ex.artifact.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        push_section(&mut prompt, "Examples", &examples);

        let previous = executed_queries(request.history);
        if !previous.is_empty() {
            let body = previous
                .iter()
                .map(|query| format!("```sql\n{}\n```", query.trim()))
                .collect::<Vec<_>>()
                .join("\n\n");
            push_section(&mut prompt, "Previously executed queries", &body);
        }

        Ok(prompt)
    }
}

/// Queries that ran successfully earlier in the conversation, oldest first
fn executed_queries(history: &[Message]) -> Vec<&str> {
    let mut queries = Vec::new();
    for (idx, message) in history.iter().enumerate() {
        let Some(call) = &message.tool_call else {
            continue;
        };
        if call.name != QUERY_TABLE_TOOL {
            continue;
        }
        let succeeded = history[idx + 1..].iter().any(|m| {
            m.kind == MessageKind::ToolResult
                && m.tool_result
                    .as_ref()
                    .is_some_and(|r| r.call_id == call.id && r.success)
        });
        if let (true, Some(query)) = (succeeded, call.str_arg("query")) {
            queries.push(query);
        }
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use datachat_core::{
        ColumnInfo, ContextSnippet, FewShotExample, InMemoryVectorStore, Thread, ToolCall,
        VectorStore,
    };

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn similarity_search(
            &self,
            _query: &str,
            _k: usize,
        ) -> datachat_core::Result<Vec<FewShotExample>> {
            Err(datachat_core::Error::VectorStore("index offline".into()))
        }
    }

    fn context() -> Vec<ContextSnippet> {
        vec![ContextSnippet::new("br_ibge_populacao.uf")
            .with_column(ColumnInfo::new("sigla_uf", "STRING"))
            .with_column(ColumnInfo::new("populacao", "INT64"))]
    }

    #[tokio::test]
    async fn test_empty_store_omits_examples() {
        let formatter = SqlPromptFormatter::new(4);
        let store = InMemoryVectorStore::new();
        let context = context();

        let prompt = formatter
            .format(
                PromptRequest::new("Which state has the largest population?")
                    .with_context(&context)
                    .with_few_shot(Some(&store)),
            )
            .await
            .unwrap();

        assert!(prompt.starts_with(DEFAULT_SQL_TEMPLATE));
        assert!(prompt.contains("## Dataset context"));
        assert!(prompt.contains("populacao (INT64)"));
        assert!(!prompt.contains("## Examples"));
        assert!(!prompt.contains("Question:"));
    }

    #[tokio::test]
    async fn test_similar_example_is_included() {
        let formatter = SqlPromptFormatter::new(1);
        let store = InMemoryVectorStore::from_examples(vec![
            FewShotExample::new("Inflation rate per year", "SELECT ano, ipca FROM inflacao"),
            FewShotExample::new(
                "Which state has the largest population?",
                "SELECT sigla_uf FROM populacao ORDER BY populacao DESC LIMIT 1",
            ),
        ]);

        let prompt = formatter
            .format(
                PromptRequest::new("Which state has the largest population?")
                    .with_few_shot(Some(&store)),
            )
            .await
            .unwrap();

        assert!(prompt.contains("## Examples"));
        assert!(prompt.contains(
            "Question: Which state has the largest population?\nSQL Query:\n```sql\nSELECT sigla_uf"
        ));
        assert!(!prompt.contains("ipca"));
    }

    #[tokio::test]
    async fn test_no_store_and_broken_store_degrade_alike() {
        let formatter = SqlPromptFormatter::new(4);
        let without = formatter.format(PromptRequest::new("q")).await.unwrap();
        let broken = formatter
            .format(PromptRequest::new("q").with_few_shot(Some(&BrokenStore)))
            .await
            .unwrap();
        assert_eq!(without, broken);
        assert_eq!(without, DEFAULT_SQL_TEMPLATE);
    }

    #[tokio::test]
    async fn test_previous_queries_only_include_successes() {
        let mut thread = Thread::new("t");
        thread.append(Message::user("population of SP?")).unwrap();
        let bad = ToolCall::new(QUERY_TABLE_TOOL, serde_json::json!({"query": "SELECT bad"}));
        thread.append(Message::tool_call(bad.clone())).unwrap();
        thread.append(Message::tool_result(&bad.id, false, "Error: syntax")).unwrap();
        let good = ToolCall::new(QUERY_TABLE_TOOL, serde_json::json!({"query": "SELECT good"}));
        thread.append(Message::tool_call(good.clone())).unwrap();
        thread.append(Message::tool_result(&good.id, true, "[]")).unwrap();

        let history = thread.recent_history(None);
        let prompt = SqlPromptFormatter::new(4)
            .format(PromptRequest::new("and RJ?").with_history(&history))
            .await
            .unwrap();

        assert!(prompt.contains("## Previously executed queries"));
        assert!(prompt.contains("SELECT good"));
        assert!(!prompt.contains("SELECT bad"));
    }

    #[tokio::test]
    async fn test_custom_template_is_deterministic() {
        let formatter = SqlPromptFormatter::with_template("Answer with SQL.", 2);
        let context = context();
        let request = PromptRequest::new("q").with_context(&context);

        let first = formatter.format(request).await.unwrap();
        let second = formatter.format(request).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("Answer with SQL.\n\n## Dataset context"));
    }
}
