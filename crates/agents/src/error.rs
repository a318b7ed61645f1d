//! Error types for the agents

use datachat_core::Thread;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that end an agent's turn.
///
/// Recoverable problems (query execution errors, unparseable classifications,
/// invalid chart types) are handled inside the agent loops and only show up
/// here once their retry bound is exhausted.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Schema metadata could not be fetched
    #[error("Context fetch failed: {message}")]
    ContextFetch { message: String },

    /// The chat model could not be reached or answered with an error
    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String },

    /// A model call exceeded its timeout
    #[error("Model call timed out after {seconds} seconds")]
    ModelTimeout { seconds: u64 },

    /// Every query attempt failed
    #[error("Query failed after {attempts} attempts: {last_error}")]
    QueryFailed { attempts: usize, last_error: String },

    /// Loading or saving the thread failed
    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    /// Invalid assistant configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other core error
    #[error(transparent)]
    Core(#[from] datachat_core::Error),
}

impl AgentError {
    /// Map a context provider failure
    pub fn context_fetch(err: datachat_core::Error) -> Self {
        Self::ContextFetch {
            message: err.to_string(),
        }
    }

    /// Map a chat model failure
    pub fn model(err: datachat_core::Error) -> Self {
        match err {
            datachat_core::Error::ModelTimeout { seconds } => Self::ModelTimeout { seconds },
            datachat_core::Error::ModelUnavailable(message) => Self::ModelUnavailable { message },
            other => Self::ModelUnavailable {
                message: other.to_string(),
            },
        }
    }

    /// Map a checkpointer failure
    pub fn checkpoint(err: datachat_core::Error) -> Self {
        Self::Checkpoint {
            message: err.to_string(),
        }
    }

    /// Explanation shown to the user when the turn fails
    pub fn user_message(&self) -> String {
        match self {
            Self::ContextFetch { .. } => {
                "Sorry, I couldn't load the dataset information needed to answer your question. Please try again in a moment.".to_string()
            }
            Self::ModelUnavailable { .. } | Self::ModelTimeout { .. } => {
                "Sorry, the language model is not responding right now. Please try again in a moment.".to_string()
            }
            Self::QueryFailed { attempts, last_error } => format!(
                "Sorry, I couldn't find an answer to your question. I tried {} queries and the last one failed with: {}. Feel free to rephrase it or ask something different.",
                attempts, last_error
            ),
            Self::Checkpoint { .. } => {
                "Sorry, I couldn't access the conversation history. Please try again.".to_string()
            }
            Self::Config { .. } | Self::Serialization(_) | Self::Core(_) => {
                "Sorry, something went wrong while answering your question. Please try again.".to_string()
            }
        }
    }
}

/// A failed assistant turn.
///
/// Carries the thread as it stood when the turn failed, with the
/// explanation already appended.
#[derive(Debug, Error)]
#[error("Turn failed for thread {thread_id}: {error}")]
pub struct TurnError {
    pub thread_id: String,
    #[source]
    pub error: AgentError,
    /// Natural-language explanation appended to the thread
    pub explanation: String,
    pub thread: Box<Thread>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_mapping() {
        let err = AgentError::model(datachat_core::Error::ModelTimeout { seconds: 30 });
        assert!(matches!(err, AgentError::ModelTimeout { seconds: 30 }));

        let err = AgentError::model(datachat_core::Error::ModelUnavailable("503".into()));
        assert!(matches!(err, AgentError::ModelUnavailable { ref message } if message == "503"));

        let err = AgentError::model(datachat_core::Error::InvalidInput("bad".into()));
        assert!(matches!(err, AgentError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_user_message_mentions_last_error() {
        let err = AgentError::QueryFailed {
            attempts: 3,
            last_error: "Unrecognized name: populacao".to_string(),
        };
        let text = err.user_message();
        assert!(text.contains("3 queries"));
        assert!(text.contains("Unrecognized name: populacao"));
        assert!(!text.contains("QueryFailed"));
    }
}
