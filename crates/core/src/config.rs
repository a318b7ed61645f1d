//! Assistant configuration
//!
//! Every option has a default, so `AssistantConfig::default()` is a working
//! configuration. `from_env` overrides fields from `DATACHAT_*` variables.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o";
pub const DEFAULT_SQL_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_FEW_SHOT_TOP_K: usize = 4;
pub const DEFAULT_CLASSIFY_ATTEMPTS: usize = 2;
pub const DEFAULT_QUESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Model identifier or URI passed to the chat model
    pub model: String,

    /// Project billed for warehouse queries. Read by the host when it
    /// constructs its `Warehouse`; the agents only log it.
    pub billing_project: Option<String>,

    /// Project holding the queried datasets. Host-side, like `billing_project`.
    pub query_project: Option<String>,

    /// Maximum query executions per SQL turn
    pub sql_max_attempts: usize,

    /// Number of few-shot examples retrieved per prompt
    pub few_shot_top_k: usize,

    /// Maximum rows kept from a query result
    pub row_limit: Option<usize>,

    /// Maximum router classification attempts before defaulting to SQL
    pub classify_attempts: usize,

    /// Number of past questions sent to the model; `None` keeps the whole thread
    pub question_limit: Option<usize>,

    /// Timeout for a single model call, in seconds
    pub model_timeout_secs: Option<u64>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            billing_project: None,
            query_project: None,
            sql_max_attempts: DEFAULT_SQL_MAX_ATTEMPTS,
            few_shot_top_k: DEFAULT_FEW_SHOT_TOP_K,
            row_limit: None,
            classify_attempts: DEFAULT_CLASSIFY_ATTEMPTS,
            question_limit: Some(DEFAULT_QUESTION_LIMIT),
            model_timeout_secs: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a valid number", name, raw);
            None
        }
    }
}

impl AssistantConfig {
    /// Build a config from defaults overridden by `DATACHAT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(model) = env_string("DATACHAT_MODEL_URI") {
            config.model = model;
        }
        config.billing_project = env_string("DATACHAT_BILLING_PROJECT");
        config.query_project = env_string("DATACHAT_QUERY_PROJECT");

        if let Some(attempts) = env_number("DATACHAT_SQL_MAX_ATTEMPTS") {
            config.sql_max_attempts = attempts;
        }
        if let Some(top_k) = env_number("DATACHAT_FEW_SHOT_TOP_K") {
            config.few_shot_top_k = top_k;
        }
        if let Some(limit) = env_number("DATACHAT_ROW_LIMIT") {
            config.row_limit = Some(limit);
        }
        if let Some(attempts) = env_number("DATACHAT_CLASSIFY_ATTEMPTS") {
            config.classify_attempts = attempts;
        }
        // "0" or "none" disables the history window
        match env_string("DATACHAT_QUESTION_LIMIT").as_deref() {
            Some("none") | Some("0") => config.question_limit = None,
            Some(_) => {
                if let Some(limit) = env_number("DATACHAT_QUESTION_LIMIT") {
                    config.question_limit = Some(limit);
                }
            }
            None => {}
        }
        if let Some(secs) = env_number("DATACHAT_MODEL_TIMEOUT_SECS") {
            config.model_timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the agents cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".into()));
        }
        if self.sql_max_attempts == 0 {
            return Err(Error::Config("sql_max_attempts must be at least 1".into()));
        }
        if self.classify_attempts == 0 {
            return Err(Error::Config("classify_attempts must be at least 1".into()));
        }
        if self.row_limit == Some(0) {
            return Err(Error::Config("row_limit must be at least 1".into()));
        }
        if self.question_limit == Some(0) {
            return Err(Error::Config("question_limit must be at least 1".into()));
        }
        if self.model_timeout_secs == Some(0) {
            return Err(Error::Config("model_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sql_max_attempts(mut self, attempts: usize) -> Self {
        self.sql_max_attempts = attempts;
        self
    }

    pub fn with_few_shot_top_k(mut self, top_k: usize) -> Self {
        self.few_shot_top_k = top_k;
        self
    }

    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn with_question_limit(mut self, limit: Option<usize>) -> Self {
        self.question_limit = limit;
        self
    }

    pub fn with_model_timeout_secs(mut self, secs: u64) -> Self {
        self.model_timeout_secs = Some(secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sql_max_attempts, 3);
        assert_eq!(config.few_shot_top_k, 4);
        assert_eq!(config.question_limit, Some(5));
        assert!(config.row_limit.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let config = AssistantConfig::default().with_sql_max_attempts(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AssistantConfig::default();
        config.classify_attempts = 0;
        assert!(config.validate().is_err());

        let config = AssistantConfig::default().with_row_limit(0);
        assert!(config.validate().is_err());

        let config = AssistantConfig::default().with_model("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = AssistantConfig::default()
            .with_model("vertexai/gemini-2.0-flash")
            .with_few_shot_top_k(2)
            .with_row_limit(100)
            .with_question_limit(None)
            .with_model_timeout_secs(30);

        assert_eq!(config.model, "vertexai/gemini-2.0-flash");
        assert_eq!(config.few_shot_top_k, 2);
        assert_eq!(config.row_limit, Some(100));
        assert_eq!(config.question_limit, None);
        assert_eq!(config.model_timeout_secs, Some(30));
        assert!(config.validate().is_ok());
    }

    // The only test that touches the process environment
    #[test]
    fn test_from_env() {
        const VARS: [&str; 7] = [
            "DATACHAT_MODEL_URI",
            "DATACHAT_BILLING_PROJECT",
            "DATACHAT_QUERY_PROJECT",
            "DATACHAT_FEW_SHOT_TOP_K",
            "DATACHAT_ROW_LIMIT",
            "DATACHAT_QUESTION_LIMIT",
            "DATACHAT_SQL_MAX_ATTEMPTS",
        ];
        for name in VARS {
            std::env::remove_var(name);
        }

        std::env::set_var("DATACHAT_MODEL_URI", " vertexai/gemini-2.0-flash ");
        std::env::set_var("DATACHAT_BILLING_PROJECT", "");
        std::env::set_var("DATACHAT_QUERY_PROJECT", "basedosdados");
        std::env::set_var("DATACHAT_FEW_SHOT_TOP_K", "lots");
        std::env::set_var("DATACHAT_ROW_LIMIT", "250");
        std::env::set_var("DATACHAT_QUESTION_LIMIT", "none");
        let config = AssistantConfig::from_env().unwrap();
        assert_eq!(config.model, "vertexai/gemini-2.0-flash");
        assert_eq!(config.billing_project, None);
        assert_eq!(config.query_project.as_deref(), Some("basedosdados"));
        assert_eq!(config.few_shot_top_k, DEFAULT_FEW_SHOT_TOP_K);
        assert_eq!(config.row_limit, Some(250));
        assert_eq!(config.question_limit, None);

        std::env::set_var("DATACHAT_QUESTION_LIMIT", "0");
        assert_eq!(AssistantConfig::from_env().unwrap().question_limit, None);

        std::env::set_var("DATACHAT_QUESTION_LIMIT", "2");
        assert_eq!(AssistantConfig::from_env().unwrap().question_limit, Some(2));

        std::env::set_var("DATACHAT_SQL_MAX_ATTEMPTS", "0");
        assert!(matches!(AssistantConfig::from_env(), Err(Error::Config(_))));

        for name in VARS {
            std::env::remove_var(name);
        }
    }
}
