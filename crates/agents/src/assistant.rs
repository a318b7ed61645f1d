//! Assistant facade
//!
//! Loads the thread, runs one routed turn and saves the thread again. Without
//! a checkpointer every call starts from an empty thread.

use std::sync::Arc;
use std::time::Duration;

use datachat_core::{
    AssistantConfig, ChatModel, Checkpointer, ContextProvider, Message, QueryResult, Thread,
    VectorStore, VisualizationSpec, Warehouse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::ModelClient;
use crate::error::{AgentError, Result, TurnError};
use crate::prompt::{PromptFormatter, SqlPromptFormatter, VizPromptFormatter};
use crate::router::{Route, RouterAgent, ROUTER_AGENT};
use crate::sql_agent::SqlAgent;
use crate::viz_agent::VizAgent;

/// Reply to one user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub id: String,
    pub thread_id: String,
    pub route: Route,
    pub content: String,
    #[serde(default)]
    pub sql_queries: Vec<String>,
    #[serde(default)]
    pub result: Option<QueryResult>,
    #[serde(default)]
    pub visualization: Option<VisualizationSpec>,
}

pub struct Assistant {
    router: RouterAgent,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Assistant {
    /// Start building an assistant around its required collaborators
    pub fn builder(
        model: Arc<dyn ChatModel>,
        warehouse: Arc<dyn Warehouse>,
        context_provider: Arc<dyn ContextProvider>,
    ) -> AssistantBuilder {
        AssistantBuilder {
            model,
            warehouse,
            context_provider,
            config: AssistantConfig::default(),
            checkpointer: None,
            sql_examples: None,
            viz_examples: None,
            sql_formatter: None,
            viz_formatter: None,
            visualization: false,
        }
    }

    /// Answer `message` in the thread `thread_id`.
    ///
    /// On failure the thread is still saved, with an explanation appended,
    /// and returned inside the [`TurnError`].
    pub async fn invoke(
        &self,
        message: &str,
        thread_id: Option<&str>,
    ) -> std::result::Result<AssistantResponse, TurnError> {
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut thread = match self.load(&thread_id).await {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to load thread {}: {}", thread_id, e);
                let explanation = e.user_message();
                let mut thread = Thread::new(thread_id.clone());
                if let Err(append_err) =
                    thread.append(Message::error(explanation.clone()).with_agent(ROUTER_AGENT))
                {
                    warn!("Could not record failure in thread {}: {}", thread_id, append_err);
                }
                return Err(TurnError {
                    thread: Box::new(thread),
                    thread_id,
                    error: e,
                    explanation,
                });
            }
        };
        info!("Turn started for thread {} ({} messages)", thread_id, thread.len());

        match self.router.route(message, &mut thread).await {
            Ok(response) => {
                if let Err(e) = self.save(&thread).await {
                    error!("Failed to save thread {}: {}", thread_id, e);
                    let explanation = e.user_message();
                    return Err(TurnError {
                        thread_id,
                        error: e,
                        explanation,
                        thread: Box::new(thread),
                    });
                }
                debug!("Turn finished for thread {} via {}", thread_id, response.route);

                Ok(AssistantResponse {
                    id: Uuid::new_v4().to_string(),
                    thread_id,
                    route: response.route,
                    content: response.content,
                    sql_queries: response.sql_queries,
                    result: response.result,
                    visualization: response.visualization,
                })
            }
            Err(e) => {
                error!("Turn failed for thread {}: {}", thread_id, e);
                let explanation = e.user_message();

                if let Err(append_err) =
                    thread.append(Message::error(explanation.clone()).with_agent(ROUTER_AGENT))
                {
                    warn!("Could not record failure in thread {}: {}", thread_id, append_err);
                }
                if let Err(save_err) = self.save(&thread).await {
                    warn!("Failed to save thread {} after error: {}", thread_id, save_err);
                }

                Err(TurnError {
                    thread_id,
                    error: e,
                    explanation,
                    thread: Box::new(thread),
                })
            }
        }
    }

    /// Saved state of a thread, if any
    pub async fn thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        match &self.checkpointer {
            Some(checkpointer) => checkpointer.load(thread_id).await.map_err(AgentError::checkpoint),
            None => Ok(None),
        }
    }

    /// Forget a thread. Returns whether anything was deleted.
    pub async fn clear_thread(&self, thread_id: &str) -> Result<bool> {
        match &self.checkpointer {
            Some(checkpointer) => {
                let deleted = checkpointer
                    .delete(thread_id)
                    .await
                    .map_err(AgentError::checkpoint)?;
                info!("Cleared thread {} (existed: {})", thread_id, deleted);
                Ok(deleted)
            }
            None => Ok(false),
        }
    }

    async fn load(&self, thread_id: &str) -> Result<Thread> {
        Ok(self
            .thread(thread_id)
            .await?
            .unwrap_or_else(|| Thread::new(thread_id)))
    }

    async fn save(&self, thread: &Thread) -> Result<()> {
        match &self.checkpointer {
            Some(checkpointer) => checkpointer
                .save(&thread.id, thread)
                .await
                .map_err(AgentError::checkpoint),
            None => Ok(()),
        }
    }
}

/// Builder for [`Assistant`]
pub struct AssistantBuilder {
    model: Arc<dyn ChatModel>,
    warehouse: Arc<dyn Warehouse>,
    context_provider: Arc<dyn ContextProvider>,
    config: AssistantConfig,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    sql_examples: Option<Arc<dyn VectorStore>>,
    viz_examples: Option<Arc<dyn VectorStore>>,
    sql_formatter: Option<Arc<dyn PromptFormatter>>,
    viz_formatter: Option<Arc<dyn PromptFormatter>>,
    visualization: bool,
}

impl AssistantBuilder {
    pub fn config(mut self, config: AssistantConfig) -> Self {
        self.config = config;
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Few-shot store of question/query pairs
    pub fn sql_examples(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.sql_examples = Some(store);
        self
    }

    /// Few-shot store of question/chart pairs
    pub fn viz_examples(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.viz_examples = Some(store);
        self
    }

    pub fn sql_prompt_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.sql_formatter = Some(formatter);
        self
    }

    pub fn viz_prompt_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.viz_formatter = Some(formatter);
        self
    }

    /// Enable the visualization agent
    pub fn with_visualization(mut self) -> Self {
        self.visualization = true;
        self
    }

    pub fn build(self) -> Result<Assistant> {
        self.config.validate().map_err(|e| AgentError::Config {
            message: e.to_string(),
        })?;
        let config = self.config;

        let client = ModelClient::new(self.model, config.model.clone())
            .with_timeout(config.model_timeout_secs.map(Duration::from_secs));

        let sql_formatter = self
            .sql_formatter
            .unwrap_or_else(|| Arc::new(SqlPromptFormatter::new(config.few_shot_top_k)));
        let sql_agent = SqlAgent::new(client.clone(), self.context_provider, self.warehouse)
            .with_formatter(sql_formatter)
            .with_vector_store(self.sql_examples)
            .with_max_attempts(config.sql_max_attempts)
            .with_row_limit(config.row_limit)
            .with_question_limit(config.question_limit);

        let mut router = RouterAgent::new(client.clone(), sql_agent)
            .with_classify_attempts(config.classify_attempts)
            .with_question_limit(config.question_limit);

        if self.visualization {
            let viz_formatter = self
                .viz_formatter
                .unwrap_or_else(|| Arc::new(VizPromptFormatter::new(config.few_shot_top_k)));
            router = router.with_viz_agent(
                VizAgent::new(client)
                    .with_formatter(viz_formatter)
                    .with_vector_store(self.viz_examples),
            );
        }

        info!(
            "Built assistant for model {} (visualization: {}, checkpointer: {})",
            config.model,
            self.visualization,
            self.checkpointer.is_some()
        );
        if config.billing_project.is_some() || config.query_project.is_some() {
            info!(
                "Warehouse projects: billing {}, query {}",
                config.billing_project.as_deref().unwrap_or("<default>"),
                config.query_project.as_deref().unwrap_or("<default>")
            );
        }

        Ok(Assistant {
            router,
            checkpointer: self.checkpointer,
        })
    }
}

/// Synchronous wrapper around [`Assistant`].
///
/// Owns a current-thread runtime and blocks on the async code path. Must not
/// be used from inside another tokio runtime.
pub struct BlockingAssistant {
    inner: Assistant,
    runtime: tokio::runtime::Runtime,
}

impl BlockingAssistant {
    pub fn new(inner: Assistant) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AgentError::Core(e.into()))?;
        Ok(Self { inner, runtime })
    }

    pub fn invoke(
        &self,
        message: &str,
        thread_id: Option<&str>,
    ) -> std::result::Result<AssistantResponse, TurnError> {
        self.runtime.block_on(self.inner.invoke(message, thread_id))
    }

    pub fn thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        self.runtime.block_on(self.inner.thread(thread_id))
    }

    pub fn clear_thread(&self, thread_id: &str) -> Result<bool> {
        self.runtime.block_on(self.inner.clear_thread(thread_id))
    }
}
