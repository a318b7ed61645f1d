//! Schema metadata used to ground query generation

use std::fmt::Write;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A column of a table described by a context snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Metadata for one table or dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Fully qualified table name
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    /// A few example rows, rendered as text
    #[serde(default)]
    pub sample_values: Vec<String>,
}

impl ContextSnippet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            columns: Vec::new(),
            sample_values: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample_values.push(sample.into());
        self
    }

    /// Render the snippet as prompt text
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Table: {}", self.name);
        if let Some(description) = &self.description {
            let _ = writeln!(out, "Description: {}", description);
        }
        if !self.columns.is_empty() {
            let _ = writeln!(out, "Columns:");
            for column in &self.columns {
                match &column.description {
                    Some(desc) => {
                        let _ = writeln!(out, "  - {} ({}): {}", column.name, column.data_type, desc);
                    }
                    None => {
                        let _ = writeln!(out, "  - {} ({})", column.name, column.data_type);
                    }
                }
            }
        }
        if !self.sample_values.is_empty() {
            let _ = writeln!(out, "Sample values:");
            for sample in &self.sample_values {
                let _ = writeln!(out, "  {}", sample);
            }
        }
        out
    }
}

/// Supplies schema metadata for a question
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Fetch the snippets relevant to `question`
    async fn fetch(&self, question: &str) -> Result<Vec<ContextSnippet>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_snippet() {
        let snippet = ContextSnippet::new("census.population")
            .with_description("Population by municipality")
            .with_column(ColumnInfo::new("year", "INT64"))
            .with_column(ColumnInfo::new("population", "INT64").with_description("Residents"))
            .with_sample("{\"year\": 2020, \"population\": 1200}");

        let text = snippet.render();
        assert!(text.starts_with("Table: census.population\n"));
        assert!(text.contains("Description: Population by municipality"));
        assert!(text.contains("  - year (INT64)\n"));
        assert!(text.contains("  - population (INT64): Residents"));
        assert!(text.contains("Sample values:"));
    }

    #[test]
    fn test_render_minimal_snippet() {
        let text = ContextSnippet::new("t").render();
        assert_eq!(text, "Table: t\n");
    }
}
