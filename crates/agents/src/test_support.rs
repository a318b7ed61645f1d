//! Scripted collaborators for agent tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use datachat_core::{
    ChatModel, ChatRequest, ColumnInfo, ContextProvider, ContextSnippet, ExecutionError,
    ModelOutput, ResponseFormat, Row, ToolCall, Warehouse,
};
use serde_json::Value;

use crate::tools::QUERY_TABLE_TOOL;

/// Model answering from a fixed queue and recording every request
pub struct ScriptedModel {
    script: Mutex<VecDeque<datachat_core::Result<ModelOutput>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<datachat_core::Result<ModelOutput>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(outputs: Vec<ModelOutput>) -> Self {
        Self::new(outputs.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Name of the structured output schema or tool used by each request
    pub fn request_kinds(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| match &request.response_format {
                ResponseFormat::JsonSchema { name, .. } => name.clone(),
                ResponseFormat::Text => match request.tools.first() {
                    Some(tool) => tool.name.clone(),
                    None => "text".to_string(),
                },
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> datachat_core::Result<ModelOutput> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(datachat_core::Error::ModelUnavailable("script exhausted".into())))
    }
}

/// Warehouse answering from a fixed queue, then with `fallback`
pub struct StubWarehouse {
    script: Mutex<VecDeque<Result<Vec<Row>, ExecutionError>>>,
    fallback: Result<Vec<Row>, ExecutionError>,
    calls: Mutex<Vec<(String, Option<usize>)>>,
}

impl StubWarehouse {
    pub fn new(script: Vec<Result<Vec<Row>, ExecutionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(ExecutionError::new("no scripted result")),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(rows: Vec<Row>) -> Self {
        Self::new(vec![Ok(rows)])
    }

    pub fn always_failing(message: &str) -> Self {
        Self {
            fallback: Err(ExecutionError::new(message)),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<(String, Option<usize>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for StubWarehouse {
    async fn execute(
        &self,
        query: &str,
        row_limit: Option<usize>,
    ) -> Result<Vec<Row>, ExecutionError> {
        self.calls.lock().unwrap().push((query.to_string(), row_limit));
        let next = self.script.lock().unwrap().pop_front();
        let rows = next.unwrap_or_else(|| self.fallback.clone())?;
        Ok(match row_limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        })
    }
}

/// Context provider returning a fixed snippet list, or failing
pub struct StubContext {
    snippets: Option<Vec<ContextSnippet>>,
}

impl StubContext {
    pub fn population() -> Self {
        Self {
            snippets: Some(vec![ContextSnippet::new("br_ibge_populacao.municipio")
                .with_description("Population estimates by municipality")
                .with_column(ColumnInfo::new("ano", "INT64"))
                .with_column(ColumnInfo::new("sigla_uf", "STRING"))
                .with_column(ColumnInfo::new("populacao", "INT64"))]),
        }
    }

    pub fn failing() -> Self {
        Self { snippets: None }
    }
}

#[async_trait]
impl ContextProvider for StubContext {
    async fn fetch(&self, _question: &str) -> datachat_core::Result<Vec<ContextSnippet>> {
        self.snippets
            .clone()
            .ok_or_else(|| datachat_core::Error::ContextFetch("metadata API unreachable".into()))
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row).collect()
}

pub fn query_call(query: &str) -> ModelOutput {
    ModelOutput::tool_call(ToolCall::new(
        QUERY_TABLE_TOOL,
        serde_json::json!({ "query": query }),
    ))
}

pub fn route_reply(route: &str) -> ModelOutput {
    ModelOutput::text(serde_json::json!({ "route": route, "reasoning": "test" }).to_string())
}

pub fn chart_reply(chart_type: &str, x: &str, y: &str) -> ModelOutput {
    ModelOutput::text(
        serde_json::json!({
            "chart_type": chart_type,
            "title": "Population by state",
            "x_axis": x,
            "y_axis": y,
        })
        .to_string(),
    )
}
