//! Message types exchanged within a thread

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// What a message carries, beyond its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Classification,
    ToolCall,
    ToolResult,
    Visualization,
    Error,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a tool call with a fresh id
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }

    /// Read a string argument by name
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of a tool call, fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub output: String,
}

/// A message in a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Position in the thread, assigned on append
    #[serde(default)]
    pub seq: u64,

    /// Role of the message sender
    pub role: Role,

    /// Message kind
    pub kind: MessageKind,

    /// Text content
    pub content: String,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Agent that produced the message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Tool call information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Tool result information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    fn base(role: Role, kind: MessageKind, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq: 0,
            role,
            kind,
            content,
            timestamp: Utc::now(),
            agent: None,
            tool_call: None,
            tool_result: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, MessageKind::Text, content.into())
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, MessageKind::Text, content.into())
    }

    /// Create the router's classification record
    pub fn classification(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, MessageKind::Classification, content.into())
    }

    /// Create an assistant message that requests a tool call
    pub fn tool_call(call: ToolCall) -> Self {
        let mut message = Self::base(Role::Assistant, MessageKind::ToolCall, String::new());
        message.tool_call = Some(call);
        message
    }

    /// Create the tool message answering a tool call
    pub fn tool_result(call_id: impl Into<String>, success: bool, output: impl Into<String>) -> Self {
        let output = output.into();
        let mut message = Self::base(Role::Tool, MessageKind::ToolResult, output.clone());
        message.tool_result = Some(ToolResult {
            call_id: call_id.into(),
            success,
            output,
        });
        message
    }

    /// Create an assistant message carrying a serialized visualization
    pub fn visualization(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, MessageKind::Visualization, content.into())
    }

    /// Create an assistant message explaining a failed turn
    pub fn error(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, MessageKind::Error, content.into())
    }

    /// Tag the message with the agent that produced it
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}
