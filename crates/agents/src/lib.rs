//! Datachat agents
//!
//! A router classifies each message and hands it to the SQL agent, the
//! visualization agent, or both. [`Assistant`] wraps the router with thread
//! persistence.

pub mod assistant;
pub mod client;
pub mod error;
pub mod prompt;
pub mod router;
pub mod sql_agent;
pub mod tools;
pub mod viz_agent;

#[cfg(test)]
mod test_support;

pub use assistant::{Assistant, AssistantBuilder, AssistantResponse, BlockingAssistant};
pub use client::ModelClient;
pub use error::{AgentError, Result, TurnError};
pub use prompt::{PromptFormatter, PromptRequest, SqlPromptFormatter, VizPromptFormatter};
pub use router::{Classification, Route, RouterAgent, RouterResponse};
pub use sql_agent::{SqlAgent, SqlAgentState, SqlOutcome, SqlRun};
pub use viz_agent::{InferredType, TableSummary, VizAgent};
