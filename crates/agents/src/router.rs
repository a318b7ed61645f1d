//! Router agent
//!
//! Classifies each user message and dispatches it to the SQL agent, the
//! visualization agent, both, or neither.

use std::fmt;

use datachat_core::{Message, ModelOutput, QueryResult, Thread, VisualizationSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::error::Result;
use crate::sql_agent::{SqlAgent, SqlOutcome};
use crate::tools::{route_schema, ROUTE_SCHEMA};
use crate::viz_agent::{describe_chart, VizAgent, VIZ_AGENT};

/// Agent name recorded on messages
pub const ROUTER_AGENT: &str = "router";

pub const ROUTER_SYSTEM_PROMPT: &str = r#"# Role

You route questions in a data analysis assistant. Read the conversation and classify the latest user message.

# Routes

- `sql`: the user wants information that can be answered by querying the datasets.
- `sql_viz`: the user wants data and explicitly asks for a chart, plot or graph of it.
- `visualize`: the user asks for a chart of data that was already retrieved earlier in the conversation.
- `clarify`: the request is too vague to act on. Put a short follow-up question in `reply`.
- `out_of_scope`: the message has nothing to do with the datasets, like greetings or general chat. Put a short polite answer in `reply`.

Answer with a JSON object following the requested schema."#;

const CLARIFY_FALLBACK: &str =
    "Could you give me a bit more detail about what you would like to know?";

const OUT_OF_SCOPE_FALLBACK: &str =
    "I can only help with questions about the available datasets. What would you like to know about them?";

/// Where a message is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// SQL agent only
    Sql,
    /// SQL agent, then visualization agent on its result
    SqlViz,
    /// Visualization agent on the previous result
    Visualize,
    /// Ask the user for more detail
    Clarify,
    /// Not about the data
    OutOfScope,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Self::Sql,
        Self::SqlViz,
        Self::Visualize,
        Self::Clarify,
        Self::OutOfScope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::SqlViz => "sql_viz",
            Self::Visualize => "visualize",
            Self::Clarify => "clarify",
            Self::OutOfScope => "out_of_scope",
        }
    }

    /// Parse a route label, accepting the common spellings models produce
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "sql" | "sql_only" | "sql_agent" => Some(Self::Sql),
            "sql_viz" | "sql_visualization" | "sql_plus_visualization" | "sql_and_viz" => {
                Some(Self::SqlViz)
            }
            "visualize" | "viz" | "viz_agent" | "visualization" => Some(Self::Visualize),
            "clarify" | "clarification" | "clarification_needed" => Some(Self::Clarify),
            "out_of_scope" | "off_topic" => Some(Self::OutOfScope),
            _ => None,
        }
    }

    pub fn needs_visualization(&self) -> bool {
        matches!(self, Self::SqlViz | Self::Visualize)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's decision, recorded in the thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub route: Route,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// True when classification failed and the default route was used
    #[serde(default)]
    pub fallback: bool,
}

impl Classification {
    fn fallback() -> Self {
        Self {
            route: Route::Sql,
            reasoning: "Classification failed, defaulting to SQL".to_string(),
            reply: None,
            fallback: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    route: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    reply: Option<String>,
}

/// Outcome of one routed turn
#[derive(Debug, Clone, PartialEq)]
pub struct RouterResponse {
    /// Route actually taken
    pub route: Route,
    pub content: String,
    /// Queries executed during the turn
    pub sql_queries: Vec<String>,
    pub result: Option<QueryResult>,
    pub visualization: Option<VisualizationSpec>,
}

impl RouterResponse {
    fn reply(route: Route, content: String) -> Self {
        Self {
            route,
            content,
            sql_queries: Vec::new(),
            result: None,
            visualization: None,
        }
    }
}

pub struct RouterAgent {
    model: ModelClient,
    sql_agent: SqlAgent,
    viz_agent: Option<VizAgent>,
    system_prompt: String,
    classify_attempts: usize,
    question_limit: Option<usize>,
}

impl RouterAgent {
    pub fn new(model: ModelClient, sql_agent: SqlAgent) -> Self {
        Self {
            model,
            sql_agent,
            viz_agent: None,
            system_prompt: ROUTER_SYSTEM_PROMPT.to_string(),
            classify_attempts: datachat_core::config::DEFAULT_CLASSIFY_ATTEMPTS,
            question_limit: Some(datachat_core::config::DEFAULT_QUESTION_LIMIT),
        }
    }

    pub fn with_viz_agent(mut self, viz_agent: VizAgent) -> Self {
        self.viz_agent = Some(viz_agent);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Number of classification calls before falling back to SQL (at least one)
    pub fn with_classify_attempts(mut self, attempts: usize) -> Self {
        self.classify_attempts = attempts.max(1);
        self
    }

    pub fn with_question_limit(mut self, limit: Option<usize>) -> Self {
        self.question_limit = limit;
        self
    }

    /// Routes offered to the model
    fn available_routes(&self) -> Vec<&'static str> {
        Route::ALL
            .iter()
            .filter(|route| self.viz_agent.is_some() || !route.needs_visualization())
            .map(|route| route.as_str())
            .collect()
    }

    /// Handle one user message, appending everything the turn produces to `thread`
    pub async fn route(&self, message: &str, thread: &mut Thread) -> Result<RouterResponse> {
        let question = message.trim();
        thread.append(Message::user(question))?;

        let classification = self.classify(thread).await?;
        thread.append(
            Message::classification(serde_json::to_string(&classification)?)
                .with_agent(ROUTER_AGENT),
        )?;

        let route = self.resolve(classification.route, thread);
        info!(
            "Routing message in thread {} to {} (classified as {})",
            thread.id, route, classification.route
        );

        match route {
            Route::Clarify | Route::OutOfScope => {
                let fallback = if route == Route::Clarify {
                    CLARIFY_FALLBACK
                } else {
                    OUT_OF_SCOPE_FALLBACK
                };
                let content = classification
                    .reply
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string());
                thread.append(Message::assistant(content.clone()).with_agent(ROUTER_AGENT))?;
                Ok(RouterResponse::reply(route, content))
            }
            Route::Sql | Route::SqlViz => {
                let run = self.sql_agent.run(question, thread).await?;
                let sql_queries = thread.scratch.sql_queries.clone();

                let (mut content, result) = match run.outcome {
                    SqlOutcome::Answered { answer, result } => (answer, result),
                    SqlOutcome::Clarification { message } => {
                        debug!("SQL agent asked for clarification, skipping visualization");
                        return Ok(RouterResponse {
                            sql_queries,
                            ..RouterResponse::reply(route, message)
                        });
                    }
                };

                let visualization = match (route, &self.viz_agent) {
                    (Route::SqlViz, Some(viz)) => {
                        let spec = viz.prepare(&result, question).await?;
                        thread.append(
                            Message::visualization(serde_json::to_string(&spec)?)
                                .with_agent(VIZ_AGENT),
                        )?;
                        // a table fallback is covered by the SQL answer
                        if !spec.fallback {
                            let chart_answer = viz.answer(&spec, question, Some(&content)).await?;
                            thread.append(
                                Message::assistant(chart_answer.clone()).with_agent(VIZ_AGENT),
                            )?;
                            content = format!("{}\n\n{}", content, chart_answer);
                        }
                        Some(spec)
                    }
                    _ => None,
                };

                Ok(RouterResponse {
                    route,
                    content,
                    sql_queries,
                    result: Some(result),
                    visualization,
                })
            }
            Route::Visualize => {
                // resolve() only keeps this route when both exist
                let (Some(viz), Some(result)) = (&self.viz_agent, thread.scratch.last_result.clone())
                else {
                    return Ok(RouterResponse::reply(route, CLARIFY_FALLBACK.to_string()));
                };

                let spec = viz.prepare(&result, question).await?;
                thread.append(
                    Message::visualization(serde_json::to_string(&spec)?).with_agent(VIZ_AGENT),
                )?;
                let content = if spec.fallback {
                    describe_chart(&spec)
                } else {
                    viz.answer(&spec, question, None).await?
                };
                thread.append(Message::assistant(content.clone()).with_agent(VIZ_AGENT))?;

                Ok(RouterResponse {
                    route,
                    content,
                    sql_queries: Vec::new(),
                    result: Some(result),
                    visualization: Some(spec),
                })
            }
        }
    }

    /// Classify the latest message, retrying unparseable answers
    async fn classify(&self, thread: &Thread) -> Result<Classification> {
        let routes = self.available_routes();

        for attempt in 1..=self.classify_attempts {
            let request = self
                .model
                .request(self.system_prompt.clone(), thread.recent_history(self.question_limit))
                .with_json_schema(ROUTE_SCHEMA, route_schema(&routes));
            let output = self.model.complete(request).await?;

            match parse_classification(&output) {
                Ok(classification) => {
                    debug!("Classified as {} on attempt {}", classification.route, attempt);
                    return Ok(classification);
                }
                Err(reason) => warn!(
                    "Unparseable classification (attempt {}/{}): {}",
                    attempt, self.classify_attempts, reason
                ),
            }
        }

        warn!("Classification failed in thread {}, defaulting to SQL", thread.id);
        Ok(Classification::fallback())
    }

    /// Adjust the classified route to what this router can actually do
    fn resolve(&self, route: Route, thread: &Thread) -> Route {
        if route.needs_visualization() && self.viz_agent.is_none() {
            debug!("No visualization agent configured, using SQL route");
            return Route::Sql;
        }
        if route == Route::Visualize && thread.scratch.last_result.is_none() {
            debug!("No previous result to visualize, querying first");
            return Route::SqlViz;
        }
        route
    }
}

fn parse_classification(output: &ModelOutput) -> std::result::Result<Classification, String> {
    let raw: RawClassification = match output {
        ModelOutput::Text { content } => {
            serde_json::from_str(content.trim()).map_err(|e| format!("invalid JSON: {}", e))?
        }
        ModelOutput::ToolCall { call } => serde_json::from_value(call.arguments.clone())
            .map_err(|e| format!("invalid arguments: {}", e))?,
    };

    let route = Route::from_label(&raw.route).ok_or_else(|| format!("unknown route '{}'", raw.route))?;
    Ok(Classification {
        route,
        reasoning: raw.reasoning,
        reply: raw.reply,
        fallback: false,
    })
}
