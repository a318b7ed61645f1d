//! Thread model
//!
//! A Thread is the persisted unit of a conversation. Its message list is
//! append-only: sequence numbers strictly increase, timestamps never go
//! backwards, and a tool call must be answered by its tool result before any
//! other message is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageKind, Role, ToolCall};
use crate::query::QueryResult;
use crate::{Error, Result};

/// Agent-internal state carried between turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scratch {
    /// Last query that executed successfully
    #[serde(default)]
    pub last_query: Option<String>,

    /// Result of `last_query`
    #[serde(default)]
    pub last_result: Option<QueryResult>,

    /// Tool calls appended but not yet answered
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCall>,

    /// Queries executed successfully during the latest SQL turn
    #[serde(default)]
    pub sql_queries: Vec<String>,
}

/// A conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    messages: Vec<Message>,
    #[serde(default)]
    pub scratch: Scratch,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create an empty thread
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            scratch: Scratch::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The tool call waiting for its result, if any
    pub fn pending_tool_call(&self) -> Option<&ToolCall> {
        self.scratch.pending_tool_calls.first()
    }

    /// Append a message, assigning its sequence number
    pub fn append(&mut self, mut message: Message) -> Result<&Message> {
        match (self.pending_tool_call(), message.tool_result.as_ref()) {
            (Some(pending), Some(result)) if pending.id == result.call_id => {}
            (Some(pending), _) => {
                return Err(Error::InvalidInput(format!(
                    "Tool call {} must be answered before appending another message",
                    pending.id
                )));
            }
            (None, Some(result)) => {
                return Err(Error::InvalidInput(format!(
                    "Tool result {} does not answer a pending tool call",
                    result.call_id
                )));
            }
            (None, None) => {}
        }

        if let Some(last) = self.messages.last() {
            message.seq = last.seq + 1;
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        } else {
            message.seq = 1;
        }

        if let Some(call) = &message.tool_call {
            self.scratch.pending_tool_calls.push(call.clone());
        }
        if let Some(result) = &message.tool_result {
            self.scratch
                .pending_tool_calls
                .retain(|call| call.id != result.call_id);
        }

        self.updated_at = Utc::now();
        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Messages sent to the model, starting at the `question_limit`-th most
    /// recent user question. Classification records are left out.
    pub fn recent_history(&self, question_limit: Option<usize>) -> Vec<Message> {
        let start = match question_limit.filter(|limit| *limit > 0) {
            Some(limit) => {
                let mut questions = 0;
                let mut start = 0;
                for (idx, message) in self.messages.iter().enumerate().rev() {
                    if is_question(message) {
                        questions += 1;
                        if questions == limit {
                            start = idx;
                            break;
                        }
                    }
                }
                start
            }
            None => 0,
        };

        self.messages[start..]
            .iter()
            .filter(|m| m.kind != MessageKind::Classification)
            .cloned()
            .collect()
    }

    /// Most recent user question
    pub fn last_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| is_question(m))
            .map(|m| m.content.as_str())
    }
}

fn is_question(message: &Message) -> bool {
    message.role == Role::User && message.kind == MessageKind::Text
}
