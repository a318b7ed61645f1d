//! Tool and structured output schemas handed to the model

use datachat_core::{ChartType, ToolSchema};
use serde_json::{json, Value};

/// Tool the SQL agent exposes to the model
pub const QUERY_TABLE_TOOL: &str = "query_table";

/// Structured output name for router classification
pub const ROUTE_SCHEMA: &str = "route";

/// Structured output name for chart selection
pub const CHART_SCHEMA: &str = "chart";

pub fn query_table_tool() -> ToolSchema {
    ToolSchema {
        name: QUERY_TABLE_TOOL.to_string(),
        description: "Execute a SQL query against the data warehouse and return the resulting rows. \
                      Use fully qualified table names."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to execute"
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn route_schema(routes: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Short explanation of the chosen route"
            },
            "route": {
                "type": "string",
                "enum": routes
            },
            "reply": {
                "type": "string",
                "description": "Reply to the user when no agent is needed"
            }
        },
        "required": ["reasoning", "route"]
    })
}

pub fn chart_schema() -> Value {
    let chart_types: Vec<&str> = ChartType::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "reasoning": { "type": "string" },
            "chart_type": { "type": "string", "enum": chart_types },
            "title": { "type": "string" },
            "x_axis": { "type": ["string", "null"] },
            "x_axis_title": { "type": ["string", "null"] },
            "y_axis": { "type": ["string", "null"] },
            "y_axis_title": { "type": ["string", "null"] },
            "label": { "type": ["string", "null"] },
            "label_title": { "type": ["string", "null"] }
        },
        "required": ["chart_type", "title"]
    })
}
