//! SQL agent
//!
//! Turns a question into a query, runs it and answers from the result.
//!
//! ```text
//! AwaitContext -> Generate -> Execute -> Success
//!                    ^           |
//!                    +-- Retry <-+-> Fail (attempts exhausted)
//! ```
//!
//! Warehouse errors are fed back to the model as failed tool results. Only
//! context, model and thread errors end the turn early.

use std::sync::Arc;

use datachat_core::{
    ContextProvider, ExecutionError, Message, ModelOutput, QueryResult, Thread, ToolCall,
    VectorStore, Warehouse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::ModelClient;
use crate::error::{AgentError, Result};
use crate::prompt::{PromptFormatter, PromptRequest, SqlPromptFormatter};
use crate::tools::{query_table_tool, QUERY_TABLE_TOOL};

/// Agent name recorded on messages
pub const SQL_AGENT: &str = "sql_agent";

/// Rows included in the tool result shown to the model
const MAX_PREVIEW_ROWS: usize = 100;

const ANSWER_INSTRUCTION: &str = "The query above ran successfully. Answer the user's question from its result. Do not call any tool.";

/// State of the SQL agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlAgentState {
    /// Fetching schema context
    AwaitContext,
    /// Asking the model for a query
    Generate,
    /// Running the query
    Execute,
    /// Query failed, another attempt is allowed
    Retry,
    /// Query succeeded
    Success,
    /// Attempts exhausted
    Fail,
}

impl SqlAgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }
}

/// How a SQL turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutcome {
    /// A query succeeded and the model answered from its result
    Answered { answer: String, result: QueryResult },
    /// The model asked the user for more information instead of querying
    Clarification { message: String },
}

impl SqlOutcome {
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Answered { result, .. } => Some(result),
            Self::Clarification { .. } => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Answered { answer, .. } => answer,
            Self::Clarification { message } => message,
        }
    }
}

/// Result of a SQL agent run
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRun {
    pub outcome: SqlOutcome,
    /// Number of query executions
    pub attempts: usize,
    /// States visited, in order
    pub transitions: Vec<SqlAgentState>,
}

struct StateMachine {
    state: SqlAgentState,
    transitions: Vec<SqlAgentState>,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: SqlAgentState::AwaitContext,
            transitions: vec![SqlAgentState::AwaitContext],
        }
    }

    fn advance(&mut self, next: SqlAgentState) {
        debug!("SQL agent {:?} -> {:?}", self.state, next);
        if next.is_terminal() {
            debug!("SQL agent finished after {} transitions", self.transitions.len());
        }
        self.state = next;
        self.transitions.push(next);
    }
}

pub struct SqlAgent {
    model: ModelClient,
    context_provider: Arc<dyn ContextProvider>,
    warehouse: Arc<dyn Warehouse>,
    formatter: Arc<dyn PromptFormatter>,
    vector_store: Option<Arc<dyn VectorStore>>,
    max_attempts: usize,
    row_limit: Option<usize>,
    question_limit: Option<usize>,
}

impl SqlAgent {
    pub fn new(
        model: ModelClient,
        context_provider: Arc<dyn ContextProvider>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            model,
            context_provider,
            warehouse,
            formatter: Arc::new(SqlPromptFormatter::default()),
            vector_store: None,
            max_attempts: datachat_core::config::DEFAULT_SQL_MAX_ATTEMPTS,
            row_limit: None,
            question_limit: Some(datachat_core::config::DEFAULT_QUESTION_LIMIT),
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

    /// Maximum number of query executions per turn (at least one)
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn with_question_limit(mut self, limit: Option<usize>) -> Self {
        self.question_limit = limit;
        self
    }

    /// Answer `question` by querying the warehouse.
    ///
    /// Every tool call and tool result is appended to `thread`. On success
    /// the query and its result are kept in the thread scratch.
    pub async fn run(&self, question: &str, thread: &mut Thread) -> Result<SqlRun> {
        let mut machine = StateMachine::new();
        thread.scratch.sql_queries.clear();

        if thread.last_question() != Some(question) {
            thread.append(Message::user(question))?;
        }

        info!("SQL agent starting for thread {}", thread.id);
        let context = self
            .context_provider
            .fetch(question)
            .await
            .map_err(|e| {
                error!("Context fetch failed for thread {}: {}", thread.id, e);
                AgentError::context_fetch(e)
            })?;
        debug!("Fetched {} context snippets", context.len());

        let history = thread.recent_history(self.question_limit);
        let system_prompt = self
            .formatter
            .format(
                PromptRequest::new(question)
                    .with_context(&context)
                    .with_history(&history)
                    .with_few_shot(self.vector_store.as_deref()),
            )
            .await?;

        let mut attempts = 0;
        loop {
            machine.advance(SqlAgentState::Generate);
            let request = self
                .model
                .request(system_prompt.clone(), thread.recent_history(self.question_limit))
                .with_tool(query_table_tool());

            let call = match self.model.complete(request).await? {
                ModelOutput::ToolCall { call } => call,
                ModelOutput::Text { content } => {
                    info!("SQL agent asked for clarification in thread {}", thread.id);
                    thread.append(Message::assistant(content.clone()).with_agent(SQL_AGENT))?;
                    return Ok(SqlRun {
                        outcome: SqlOutcome::Clarification { message: content },
                        attempts,
                        transitions: machine.transitions,
                    });
                }
            };

            thread.append(Message::tool_call(call.clone()).with_agent(SQL_AGENT))?;
            machine.advance(SqlAgentState::Execute);
            attempts += 1;

            match self.execute(&call).await {
                Ok(result) => {
                    info!(
                        "Query succeeded on attempt {} ({} rows{})",
                        attempts,
                        result.rows.len(),
                        if result.truncated { ", truncated" } else { "" }
                    );
                    thread.append(
                        Message::tool_result(&call.id, true, render_rows(&result))
                            .with_agent(SQL_AGENT),
                    )?;
                    machine.advance(SqlAgentState::Success);

                    thread.scratch.last_query = Some(result.query.clone());
                    thread.scratch.sql_queries.push(result.query.clone());
                    thread.scratch.last_result = Some(result.clone());

                    let answer = self.answer(&system_prompt, thread, &result).await?;
                    thread.append(Message::assistant(answer.clone()).with_agent(SQL_AGENT))?;

                    return Ok(SqlRun {
                        outcome: SqlOutcome::Answered { answer, result },
                        attempts,
                        transitions: machine.transitions,
                    });
                }
                Err(e) => {
                    warn!(
                        "Query attempt {}/{} failed: {}",
                        attempts, self.max_attempts, e
                    );
                    thread.append(
                        Message::tool_result(&call.id, false, format!("Error: {}", e))
                            .with_agent(SQL_AGENT),
                    )?;

                    if attempts >= self.max_attempts {
                        machine.advance(SqlAgentState::Fail);
                        error!(
                            "SQL agent giving up after {} attempts in thread {}",
                            attempts, thread.id
                        );
                        return Err(AgentError::QueryFailed {
                            attempts,
                            last_error: e.message,
                        });
                    }
                    machine.advance(SqlAgentState::Retry);
                }
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> std::result::Result<QueryResult, ExecutionError> {
        if call.name != QUERY_TABLE_TOOL {
            return Err(ExecutionError::new(format!("Unknown tool '{}'", call.name)));
        }
        let query = match call.str_arg("query").map(str::trim) {
            Some(query) if !query.is_empty() => query,
            _ => {
                return Err(ExecutionError::new(
                    "The 'query' argument is missing or empty",
                ))
            }
        };

        // one extra row tells us whether the cap cut anything off
        let rows = self
            .warehouse
            .execute(query, self.row_limit.map(|cap| cap.saturating_add(1)))
            .await?;

        let mut result = QueryResult::new(query, rows);
        if let Some(cap) = self.row_limit {
            result.truncate(cap);
        }
        Ok(result)
    }

    async fn answer(&self, system_prompt: &str, thread: &Thread, result: &QueryResult) -> Result<String> {
        let request = self.model.request(
            format!("{}\n\n{}", system_prompt, ANSWER_INSTRUCTION),
            thread.recent_history(self.question_limit),
        );

        match self.model.complete(request).await? {
            ModelOutput::Text { content } if !content.trim().is_empty() => Ok(content),
            _ => {
                warn!("Model did not produce an answer, summarizing the result");
                Ok(summarize(result))
            }
        }
    }
}

/// Tool result text for a successful query
fn render_rows(result: &QueryResult) -> String {
    let shown = result.rows.len().min(MAX_PREVIEW_ROWS);
    let json = serde_json::to_string(&result.rows[..shown]).unwrap_or_else(|_| "[]".to_string());

    let mut out = json;
    if shown < result.rows.len() {
        out.push_str(&format!("\n(showing {} of {} rows)", shown, result.rows.len()));
    }
    if result.truncated {
        out.push_str("\n(result truncated by the row limit)");
    }
    out
}

fn summarize(result: &QueryResult) -> String {
    match result.rows.len() {
        0 => "The query returned no rows.".to_string(),
        1 => "The query returned 1 row.".to_string(),
        n => format!("The query returned {} rows.", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{query_call, rows, ScriptedModel, StubContext, StubWarehouse};
    use datachat_core::{MessageKind, Role};
    use serde_json::json;

    fn agent(model: Arc<ScriptedModel>, warehouse: Arc<StubWarehouse>) -> SqlAgent {
        SqlAgent::new(
            ModelClient::new(model, "test-model"),
            Arc::new(StubContext::population()),
            warehouse,
        )
    }

    fn failed_results(thread: &Thread) -> usize {
        thread
            .messages()
            .iter()
            .filter(|m| m.tool_result.as_ref().is_some_and(|r| !r.success))
            .count()
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let data = rows(vec![json!({"sigla_uf": "SP", "populacao": 46024937})]);
        let model = Arc::new(ScriptedModel::replies(vec![
            query_call("SELECT sigla_uf, populacao FROM uf ORDER BY populacao DESC LIMIT 1"),
            ModelOutput::text("Sao Paulo, with 46 million people."),
        ]));
        let warehouse = Arc::new(StubWarehouse::returning(data.clone()));
        let mut thread = Thread::new("t");

        let run = agent(model.clone(), warehouse.clone())
            .run("Which state has the largest population?", &mut thread)
            .await
            .unwrap();

        assert_eq!(run.attempts, 1);
        assert_eq!(
            run.transitions,
            vec![
                SqlAgentState::AwaitContext,
                SqlAgentState::Generate,
                SqlAgentState::Execute,
                SqlAgentState::Success,
            ]
        );
        let result = run.outcome.result().unwrap();
        assert_eq!(result.rows, data);
        assert_eq!(run.outcome.content(), "Sao Paulo, with 46 million people.");
        assert_eq!(failed_results(&thread), 0);

        assert_eq!(thread.scratch.last_result.as_ref(), Some(result));
        assert_eq!(thread.scratch.sql_queries.len(), 1);
        assert_eq!(thread.last().unwrap().role, Role::Assistant);

        // the answer call carries no tools
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert!(requests[1].tools.is_empty());
        assert!(requests[0].system_prompt.contains("br_ibge_populacao.municipio"));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let model = Arc::new(ScriptedModel::replies(vec![
            query_call("SELECT populacao FROM uf WHERE sigla = 'SP'"),
            query_call("SELECT populacao FROM uf WHERE uf = 'SP'"),
            query_call("SELECT populacao FROM uf WHERE sigla_uf = 'SP'"),
            ModelOutput::text("46 million."),
        ]));
        let warehouse = Arc::new(StubWarehouse::new(vec![
            Err(ExecutionError::new("Unrecognized name: sigla")),
            Err(ExecutionError::new("Unrecognized name: uf")),
            Ok(rows(vec![json!({"populacao": 46024937})])),
        ]));
        let mut thread = Thread::new("t");

        let run = agent(model.clone(), warehouse.clone())
            .with_max_attempts(3)
            .run("Population of SP?", &mut thread)
            .await
            .unwrap();

        assert_eq!(run.attempts, 3);
        assert_eq!(
            run.transitions.iter().filter(|s| **s == SqlAgentState::Retry).count(),
            2
        );
        assert_eq!(failed_results(&thread), 2);
        assert_eq!(warehouse.calls().len(), 3);

        // the model sees the previous error on the retry
        let retry_history = &model.requests()[1].messages;
        assert!(retry_history
            .iter()
            .any(|m| m.kind == MessageKind::ToolResult && m.content.contains("Unrecognized name: sigla")));
        assert_eq!(
            thread.scratch.sql_queries,
            vec!["SELECT populacao FROM uf WHERE sigla_uf = 'SP'".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fails_after_bound() {
        let model = Arc::new(ScriptedModel::replies(vec![
            query_call("SELECT a"),
            query_call("SELECT b"),
            query_call("SELECT c"),
            query_call("SELECT d"),
        ]));
        let warehouse = Arc::new(StubWarehouse::always_failing("Table not found"));
        let mut thread = Thread::new("t");

        let err = agent(model.clone(), warehouse.clone())
            .with_max_attempts(3)
            .run("q", &mut thread)
            .await
            .unwrap_err();

        match err {
            AgentError::QueryFailed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "Table not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(warehouse.calls().len(), 3);
        assert_eq!(model.remaining(), 1);
        assert_eq!(failed_results(&thread), 3);
        assert!(thread.pending_tool_call().is_none());
        assert!(thread.scratch.last_result.is_none());
    }

    #[tokio::test]
    async fn test_text_reply_is_clarification() {
        let model = Arc::new(ScriptedModel::replies(vec![ModelOutput::text(
            "Which year are you interested in?",
        )]));
        let warehouse = Arc::new(StubWarehouse::returning(Vec::new()));
        let mut thread = Thread::new("t");

        let run = agent(model, warehouse.clone())
            .run("Population?", &mut thread)
            .await
            .unwrap();

        assert_eq!(
            run.outcome,
            SqlOutcome::Clarification {
                message: "Which year are you interested in?".to_string()
            }
        );
        assert_eq!(run.attempts, 0);
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn test_context_failure_is_fatal() {
        let model = Arc::new(ScriptedModel::replies(Vec::new()));
        let agent = SqlAgent::new(
            ModelClient::new(model.clone(), "test-model"),
            Arc::new(StubContext::failing()),
            Arc::new(StubWarehouse::returning(Vec::new())),
        );
        let mut thread = Thread::new("t");

        let err = agent.run("q", &mut thread).await.unwrap_err();
        assert!(matches!(err, AgentError::ContextFetch { .. }));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_row_cap_truncates() {
        let data = rows((0..5).map(|i| json!({"n": i})).collect());
        let model = Arc::new(ScriptedModel::replies(vec![
            query_call("SELECT n FROM t"),
            ModelOutput::text("Here are the numbers."),
        ]));
        let warehouse = Arc::new(StubWarehouse::returning(data));
        let mut thread = Thread::new("t");

        let run = agent(model, warehouse.clone())
            .with_row_limit(Some(3))
            .run("numbers", &mut thread)
            .await
            .unwrap();

        let result = run.outcome.result().unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);
        assert_eq!(warehouse.calls()[0].1, Some(4));
    }

    #[tokio::test]
    async fn test_row_cap_at_usize_max() {
        let data = rows(vec![json!({"n": 1}), json!({"n": 2})]);
        let model = Arc::new(ScriptedModel::replies(vec![
            query_call("SELECT n FROM t"),
            ModelOutput::text("Two rows."),
        ]));
        let warehouse = Arc::new(StubWarehouse::returning(data.clone()));
        let mut thread = Thread::new("t");

        let run = agent(model, warehouse.clone())
            .with_row_limit(Some(usize::MAX))
            .run("numbers", &mut thread)
            .await
            .unwrap();

        let result = run.outcome.result().unwrap();
        assert_eq!(result.rows, data);
        assert!(!result.truncated);
        assert_eq!(warehouse.calls()[0].1, Some(usize::MAX));
        assert!(run.transitions.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_missing_query_argument_counts_as_attempt() {
        let model = Arc::new(ScriptedModel::replies(vec![
            ModelOutput::tool_call(ToolCall::new(QUERY_TABLE_TOOL, json!({}))),
            query_call("SELECT 1 AS n"),
            ModelOutput::text("One."),
        ]));
        let warehouse = Arc::new(StubWarehouse::returning(rows(vec![json!({"n": 1})])));
        let mut thread = Thread::new("t");

        let run = agent(model, warehouse.clone())
            .run("q", &mut thread)
            .await
            .unwrap();

        assert_eq!(run.attempts, 2);
        assert_eq!(warehouse.calls().len(), 1);
        assert_eq!(failed_results(&thread), 1);
    }

    #[tokio::test]
    async fn test_previous_turn_queries_are_cleared() {
        let model = Arc::new(ScriptedModel::replies(vec![
            ModelOutput::text("Which state?"),
        ]));
        let mut thread = Thread::new("t");
        thread.scratch.sql_queries.push("SELECT old".to_string());

        agent(model, Arc::new(StubWarehouse::returning(Vec::new())))
            .run("Population?", &mut thread)
            .await
            .unwrap();

        assert!(thread.scratch.sql_queries.is_empty());
    }

    #[test]
    fn test_render_rows_preview() {
        let mut result = QueryResult::new("q", rows((0..150).map(|i| json!({"n": i})).collect()));
        result.truncate(120);
        let text = render_rows(&result);
        assert!(text.contains("(showing 100 of 120 rows)"));
        assert!(text.contains("truncated"));
    }
}
