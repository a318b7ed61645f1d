//! Core library for datachat
//!
//! This crate contains the conversation model and the collaborator
//! interfaces the agents are built on:
//! - Threads, messages and checkpointers
//! - Chat model, warehouse, context provider and vector store traits
//! - Query results and visualization specs
//! - Assistant configuration and logging setup

pub mod chart;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod thread;
pub mod vector;

pub use chart::{ChartType, VisualizationSpec};
pub use checkpoint::{Checkpointer, FileCheckpointer, MemoryCheckpointer};
pub use config::AssistantConfig;
pub use context::{ColumnInfo, ContextProvider, ContextSnippet};
pub use error::Error;
pub use model::{ChatModel, ChatRequest, ModelOutput, ResponseFormat, ToolSchema};
pub use query::{ExecutionError, QueryResult, Row, Warehouse};
pub use thread::{Message, MessageKind, Role, Scratch, Thread, ToolCall, ToolResult};
pub use vector::{FewShotExample, InMemoryVectorStore, VectorStore};

pub type Result<T> = std::result::Result<T, Error>;
