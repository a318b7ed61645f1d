use async_trait::async_trait;

use super::{push_section, retrieve_examples, PromptFormatter, PromptRequest};

pub const DEFAULT_VIZ_TEMPLATE: &str = r#"# Role

You are a data visualization specialist. Given a user question and the shape of a query result, you choose the chart that best answers the question.

# Instructions

1. Pick exactly one chart type: bar, horizontal_bar, line, pie, scatter or table.
2. Bind `x_axis`, `y_axis` and optionally `label` to column names that appear in the result. Never invent column names.
3. Use `line` for values over time, `bar` or `horizontal_bar` to compare categories, `pie` for parts of a whole with few categories and `scatter` for the relation between two numeric columns.
4. Use `table` when no chart makes the data clearer.
5. Give the chart a short descriptive title and readable axis titles.

Answer with a JSON object following the requested schema."#;

/// Prompt formatter for the visualization agent
pub struct VizPromptFormatter {
    template: String,
    top_k: usize,
}

impl VizPromptFormatter {
    pub fn new(top_k: usize) -> Self {
        Self::with_template(DEFAULT_VIZ_TEMPLATE, top_k)
    }

    pub fn with_template(template: impl Into<String>, top_k: usize) -> Self {
        Self {
            template: template.into(),
            top_k,
        }
    }
}

impl Default for VizPromptFormatter {
    fn default() -> Self {
        Self::new(datachat_core::config::DEFAULT_FEW_SHOT_TOP_K)
    }
}

#[async_trait]
impl PromptFormatter for VizPromptFormatter {
    async fn format(&self, request: PromptRequest<'_>) -> datachat_core::Result<String> {
        let mut prompt = self.template.trim_end().to_string();

        let examples = retrieve_examples(request.few_shot, request.question, self.top_k).await;
        let examples = examples
            .iter()
            .map(|ex| format!("Question: {}\nChart:\n```json\n{}\n```", ex.question, ex.artifact.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        push_section(&mut prompt, "Examples", &examples);

        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datachat_core::{FewShotExample, InMemoryVectorStore};

    #[tokio::test]
    async fn test_chart_examples() {
        let store = InMemoryVectorStore::from_examples(vec![FewShotExample::new(
            "Population over the years",
            r#"{"chart_type": "line", "x_axis": "ano", "y_axis": "populacao"}"#,
        )]);

        let prompt = VizPromptFormatter::new(2)
            .format(PromptRequest::new("Population over time").with_few_shot(Some(&store)))
            .await
            .unwrap();

        assert!(prompt.starts_with(DEFAULT_VIZ_TEMPLATE));
        assert!(prompt.contains("Question: Population over the years\nChart:\n```json\n{\"chart_type\": \"line\""));
    }

    #[tokio::test]
    async fn test_without_store_is_template_only() {
        let prompt = VizPromptFormatter::with_template("Pick a chart.", 2)
            .format(PromptRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(prompt, "Pick a chart.");
    }
}
