//! Chat model interface
//!
//! The agents only need a single completion call. Providers map
//! [`ChatRequest`] onto their own wire format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::thread::{Message, ToolCall};
use crate::Result;

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// Output constraint for a completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text
    Text,
    /// A JSON document matching `schema`, returned as text
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

/// A single completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier or URI
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    pub response_format: ResponseFormat,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            messages,
            tools: Vec::new(),
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_tool(mut self, tool: ToolSchema) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_json_schema(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.response_format = ResponseFormat::JsonSchema {
            name: name.into(),
            schema,
        };
        self
    }
}

/// What the model answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelOutput {
    Text { content: String },
    ToolCall { call: ToolCall },
}

impl ModelOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::ToolCall { call }
    }
}

/// LLM with tool calling and structured output support
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion.
    ///
    /// Failures to reach the provider should be reported as
    /// [`Error::ModelUnavailable`](crate::Error::ModelUnavailable).
    async fn complete(&self, request: ChatRequest) -> Result<ModelOutput>;
}
