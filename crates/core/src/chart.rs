//! Visualization metadata
//!
//! Charts are described, never rendered. A [`VisualizationSpec`] names the
//! chart type and which result columns go on which axis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Supported chart types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    HorizontalBar,
    Line,
    Pie,
    Scatter,
    Table,
}

impl ChartType {
    pub const ALL: [ChartType; 6] = [
        Self::Bar,
        Self::HorizontalBar,
        Self::Line,
        Self::Pie,
        Self::Scatter,
        Self::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::HorizontalBar => "horizontal_bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
            Self::Table => "table",
        }
    }

    /// Whether the chart needs both an x and a y column
    pub fn requires_axes(&self) -> bool {
        !matches!(self, Self::Table)
    }
}

impl FromStr for ChartType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "bar" => Ok(Self::Bar),
            "horizontal_bar" | "hbar" | "barh" => Ok(Self::HorizontalBar),
            "line" => Ok(Self::Line),
            "pie" => Ok(Self::Pie),
            "scatter" => Ok(Self::Scatter),
            "table" => Ok(Self::Table),
            _ => Err(Error::InvalidInput(format!("Invalid chart type: {}", s))),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plotting metadata for a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    pub chart_type: ChartType,

    /// Column plotted on the x-axis
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub x_axis_title: Option<String>,

    /// Column plotted on the y-axis
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub y_axis_title: Option<String>,

    /// Column used to split series (legend)
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub label_title: Option<String>,

    pub title: String,

    /// Model's explanation for the recommendation
    #[serde(default)]
    pub reasoning: Option<String>,

    /// True for the table fallback
    #[serde(default)]
    pub fallback: bool,
}

impl VisualizationSpec {
    /// The generic table spec used when no valid chart could be chosen
    pub fn table(title: impl Into<String>) -> Self {
        Self {
            chart_type: ChartType::Table,
            x_axis: None,
            x_axis_title: None,
            y_axis: None,
            y_axis_title: None,
            label: None,
            label_title: None,
            title: title.into(),
            reasoning: None,
            fallback: true,
        }
    }

    /// Columns referenced by the axis bindings
    pub fn bound_columns(&self) -> Vec<&str> {
        [&self.x_axis, &self.y_axis, &self.label]
            .into_iter()
            .filter_map(|c| c.as_deref())
            .collect()
    }
}
