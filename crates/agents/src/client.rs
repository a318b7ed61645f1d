use std::sync::Arc;
use std::time::Duration;

use datachat_core::{ChatModel, ChatRequest, Message, ModelOutput};
use tracing::{debug, error};

use crate::error::{AgentError, Result};

/// Chat model handle shared by the agents.
///
/// Carries the model identifier and the per-call timeout so each agent
/// builds requests the same way.
#[derive(Clone)]
pub struct ModelClient {
    model: Arc<dyn ChatModel>,
    model_id: String,
    timeout: Option<Duration>,
}

impl ModelClient {
    pub fn new(model: Arc<dyn ChatModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Start a request addressed to this client's model
    pub fn request(&self, system_prompt: impl Into<String>, messages: Vec<Message>) -> ChatRequest {
        ChatRequest::new(self.model_id.clone(), system_prompt, messages)
    }

    /// Run one completion, applying the timeout if one is set
    pub async fn complete(&self, request: ChatRequest) -> Result<ModelOutput> {
        debug!(
            "Calling model {} with {} messages",
            request.model,
            request.messages.len()
        );

        let call = self.model.complete(request);
        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(output) => output,
                Err(_) => {
                    error!("Model {} timed out after {:?}", self.model_id, timeout);
                    return Err(AgentError::ModelTimeout {
                        seconds: timeout.as_secs(),
                    });
                }
            },
            None => call.await,
        };

        output.map_err(|e| {
            error!("Model {} failed: {}", self.model_id, e);
            AgentError::model(e)
        })
    }
}
