//! Visualization agent
//!
//! Picks a chart type and axis bindings for a query result. The model only
//! sees the result's shape (column names, inferred types, a few samples).
//! An invalid choice gets one retry with feedback, then the agent falls back
//! to a plain table. A chosen chart is then introduced by a short model-written
//! message.

use std::fmt;
use std::sync::Arc;

use datachat_core::{ChartType, Message, ModelOutput, QueryResult, VectorStore, VisualizationSpec};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::error::Result;
use crate::prompt::{PromptFormatter, PromptRequest, VizPromptFormatter};
use crate::tools::{chart_schema, CHART_SCHEMA};

/// Agent name recorded on messages
pub const VIZ_AGENT: &str = "viz_agent";

/// Model calls per result: the first choice plus one retry
const MAX_ATTEMPTS: usize = 2;

const SAMPLES_PER_COLUMN: usize = 3;

pub const CHART_ANSWER_PROMPT: &str = r#"You write the short message that introduces a chart in a data analysis assistant. The chart is shown right after your message.

You receive the user's question, the answer already given to it (if any) and the chart as JSON.

- Introduce the chart naturally, as a continuation of the answer. Say what it shows.
- Point out a key value or trend only if the chart metadata supports it.
- Do not repeat the answer you were given.
- Reply in the language of the question, in one or two sentences."#;

/// Value type inferred for a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    Integer,
    Float,
    Boolean,
    Text,
    /// Only nulls
    Null,
    Mixed,
}

impl InferredType {
    fn of(values: &[&Value]) -> Self {
        let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
        if non_null.is_empty() {
            return Self::Null;
        }
        if non_null.iter().all(|v| v.is_i64() || v.is_u64()) {
            Self::Integer
        } else if non_null.iter().all(|v| v.is_number()) {
            Self::Float
        } else if non_null.iter().all(|v| v.is_boolean()) {
            Self::Boolean
        } else if non_null.iter().all(|v| v.is_string()) {
            Self::Text
        } else {
            Self::Mixed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Null => "null",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub inferred: InferredType,
    /// First distinct non-null values
    pub samples: Vec<Value>,
}

/// Shape of a query result, without its data
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub columns: Vec<ColumnSummary>,
    pub row_count: usize,
}

impl TableSummary {
    pub fn from_result(result: &QueryResult) -> Self {
        let columns = result
            .columns
            .iter()
            .map(|name| {
                let values: Vec<&Value> = result.rows.iter().filter_map(|row| row.get(name)).collect();
                let mut samples: Vec<Value> = Vec::new();
                for value in values.iter().filter(|v| !v.is_null()) {
                    if samples.len() == SAMPLES_PER_COLUMN {
                        break;
                    }
                    if !samples.contains(*value) {
                        samples.push((*value).clone());
                    }
                }
                ColumnSummary {
                    name: name.clone(),
                    inferred: InferredType::of(&values),
                    samples,
                }
            })
            .collect();

        Self {
            columns,
            row_count: result.rows.len(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows: {}", self.row_count)?;
        writeln!(f, "Columns:")?;
        for column in &self.columns {
            let samples = column
                .samples
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  - {} ({}): {}", column.name, column.inferred.as_str(), samples)?;
        }
        Ok(())
    }
}

/// Chart choice as returned by the model
#[derive(Debug, Deserialize)]
struct ChartChoice {
    chart_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    x_axis: Option<String>,
    #[serde(default)]
    x_axis_title: Option<String>,
    #[serde(default)]
    y_axis: Option<String>,
    #[serde(default)]
    y_axis_title: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    label_title: Option<String>,
}

pub struct VizAgent {
    model: ModelClient,
    formatter: Arc<dyn PromptFormatter>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl VizAgent {
    pub fn new(model: ModelClient) -> Self {
        Self {
            model,
            formatter: Arc::new(VizPromptFormatter::default()),
            vector_store: None,
        }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_vector_store(mut self, store: Option<Arc<dyn VectorStore>>) -> Self {
        self.vector_store = store;
        self
    }

    /// Choose a visualization for `result`.
    ///
    /// Model failures are errors. Invalid chart choices are not: they end
    /// in the table fallback.
    pub async fn prepare(&self, result: &QueryResult, question: &str) -> Result<VisualizationSpec> {
        let title = question.trim();
        if result.is_empty() {
            info!("Empty result, using table visualization");
            return Ok(VisualizationSpec::table(title));
        }

        let summary = TableSummary::from_result(result);
        let system_prompt = self
            .formatter
            .format(PromptRequest::new(question).with_few_shot(self.vector_store.as_deref()))
            .await?;

        let mut messages = vec![Message::user(format!(
            "Question: {}\n\n{}",
            question.trim(),
            summary
        ))];

        for attempt in 1..=MAX_ATTEMPTS {
            let request = self
                .model
                .request(system_prompt.clone(), messages.clone())
                .with_json_schema(CHART_SCHEMA, chart_schema());
            let output = self.model.complete(request).await?;

            match parse_choice(&output, &summary, title) {
                Ok(spec) => {
                    debug!("Chose {} chart on attempt {}", spec.chart_type, attempt);
                    return Ok(spec);
                }
                Err(reason) => {
                    warn!("Invalid chart choice (attempt {}/{}): {}", attempt, MAX_ATTEMPTS, reason);
                    messages.push(Message::assistant(raw_output(&output)));
                    messages.push(Message::user(format!(
                        "{} Choose chart_type from: {}. Use only these columns: {}.",
                        reason,
                        chart_type_list(),
                        summary
                            .columns
                            .iter()
                            .map(|c| c.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
            }
        }

        info!("Falling back to table visualization");
        Ok(VisualizationSpec::table(title))
    }

    /// Message introducing `spec`.
    ///
    /// Any copy of `sql_answer` in the reply is removed, so the two can be
    /// shown one after the other. Blank replies fall back to [`describe_chart`].
    pub async fn answer(
        &self,
        spec: &VisualizationSpec,
        question: &str,
        sql_answer: Option<&str>,
    ) -> Result<String> {
        let mut messages = vec![Message::user(format!("User question: {}", question.trim()))];
        if let Some(sql_answer) = sql_answer {
            messages.push(Message::user(format!("Question answer:\n\n{}", sql_answer)));
        }
        messages.push(Message::user(format!(
            "Chart: {}",
            serde_json::to_string_pretty(spec)?
        )));

        let request = self.model.request(CHART_ANSWER_PROMPT, messages);
        let content = match self.model.complete(request).await? {
            ModelOutput::Text { content } => without_answer(&content, sql_answer),
            ModelOutput::ToolCall { call } => {
                warn!("Ignoring tool call '{}' in chart answer", call.name);
                String::new()
            }
        };

        if content.is_empty() {
            debug!("Blank chart answer, describing the chart instead");
            return Ok(describe_chart(spec));
        }
        Ok(content)
    }
}

/// Plain description of a chart, used when no model-written one is available
pub fn describe_chart(spec: &VisualizationSpec) -> String {
    if spec.fallback {
        return format!("This data is best read as a table: {}.", spec.title);
    }
    let chart = spec.chart_type.as_str().replace('_', " ");
    match (&spec.x_axis, &spec.y_axis) {
        (Some(x), Some(y)) => format!("Here is a {} chart of {} by {}: {}.", chart, y, x, spec.title),
        _ => format!("Here is a {} chart: {}.", chart, spec.title),
    }
}

fn without_answer(text: &str, sql_answer: Option<&str>) -> String {
    match sql_answer.map(str::trim).filter(|answer| !answer.is_empty()) {
        Some(answer) => text.replace(answer, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn chart_type_list() -> String {
    ChartType::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn raw_output(output: &ModelOutput) -> String {
    match output {
        ModelOutput::Text { content } => content.clone(),
        ModelOutput::ToolCall { call } => call.arguments.to_string(),
    }
}

/// Strip a markdown code fence around a JSON answer
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn parse_choice(
    output: &ModelOutput,
    summary: &TableSummary,
    default_title: &str,
) -> std::result::Result<VisualizationSpec, String> {
    let choice: ChartChoice = match output {
        ModelOutput::Text { content } => serde_json::from_str(strip_fence(content))
            .map_err(|e| format!("The answer is not a valid JSON chart description ({}).", e))?,
        ModelOutput::ToolCall { call } => serde_json::from_value(call.arguments.clone())
            .map_err(|e| format!("The answer is not a valid JSON chart description ({}).", e))?,
    };

    let raw_type = choice
        .chart_type
        .ok_or_else(|| "The chart_type field is missing.".to_string())?;
    let chart_type: ChartType = raw_type
        .parse()
        .map_err(|_| format!("'{}' is not a supported chart type.", raw_type))?;

    let spec = VisualizationSpec {
        chart_type,
        x_axis: choice.x_axis.filter(|c| !c.is_empty()),
        x_axis_title: choice.x_axis_title,
        y_axis: choice.y_axis.filter(|c| !c.is_empty()),
        y_axis_title: choice.y_axis_title,
        label: choice.label.filter(|c| !c.is_empty()),
        label_title: choice.label_title,
        title: choice
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title.to_string()),
        reasoning: choice.reasoning,
        fallback: false,
    };

    if let Some(unknown) = spec.bound_columns().into_iter().find(|c| !summary.has_column(c)) {
        return Err(format!("Column '{}' is not in the result.", unknown));
    }
    if chart_type.requires_axes() && (spec.x_axis.is_none() || spec.y_axis.is_none()) {
        return Err(format!("A {} chart needs both x_axis and y_axis.", chart_type));
    }

    Ok(spec)
}
