//! Query execution against the data warehouse

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A result row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Error reported by the warehouse for a single query.
///
/// Syntax and semantic errors end up here and are fed back to the model,
/// so the message should be the warehouse's own text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Interface to the queryable data warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a query, returning at most `row_limit` rows when a limit is given
    async fn execute(
        &self,
        query: &str,
        row_limit: Option<usize>,
    ) -> std::result::Result<Vec<Row>, ExecutionError>;
}

/// Tabular output of an executed query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query text that produced the rows
    pub query: String,

    /// Column names in first-seen order
    pub columns: Vec<String>,

    pub rows: Vec<Row>,

    /// Set when the row cap cut the result short
    #[serde(default)]
    pub truncated: bool,
}

impl QueryResult {
    /// Build a result from warehouse rows
    pub fn new(query: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        Self {
            query: query.into(),
            columns,
            rows,
            truncated: false,
        }
    }

    /// Cut the rows down to `cap`, marking the result as truncated when rows were dropped
    pub fn truncate(&mut self, cap: usize) {
        if self.rows.len() > cap {
            self.rows.truncate(cap);
            self.truncated = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column-major view of the rows. Rows missing a column contribute `null`,
    /// so every column has one value per row.
    pub fn columnar(&self) -> BTreeMap<String, Vec<Value>> {
        self.columns
            .iter()
            .map(|column| {
                let values = self
                    .rows
                    .iter()
                    .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
                    .collect();
                (column.clone(), values)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_columns_in_first_seen_order() {
        let result = QueryResult::new(
            "SELECT * FROM t",
            vec![row(json!({"year": 2020, "total": 3})), row(json!({"year": 2021, "extra": true}))],
        );
        assert_eq!(result.columns.len(), 3);
        assert!(result.columns.contains(&"extra".to_string()));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_truncate_sets_flag_only_when_rows_dropped() {
        let rows: Vec<Row> = (0..5).map(|i| row(json!({"n": i}))).collect();

        let mut exact = QueryResult::new("q", rows.clone());
        exact.truncate(5);
        assert!(!exact.truncated);
        assert_eq!(exact.rows.len(), 5);

        let mut cut = QueryResult::new("q", rows);
        cut.truncate(2);
        assert!(cut.truncated);
        assert_eq!(cut.rows.len(), 2);
    }

    #[test]
    fn test_columnar_pads_missing_values() {
        let result = QueryResult::new(
            "q",
            vec![row(json!({"k1": "v1", "k2": "v2"})), row(json!({"k1": "v3"}))],
        );
        let columns = result.columnar();
        assert_eq!(columns["k1"], vec![json!("v1"), json!("v3")]);
        assert_eq!(columns["k2"], vec![json!("v2"), Value::Null]);
    }
}
