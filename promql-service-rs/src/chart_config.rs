// promql-service-rs/src/chart_config.rs
// Chart rendering configuration: the closed set of chart types and the
// library each one renders with.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Chart type enumeration with camelCase wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartType {
    #[serde(rename = "lineChart")]
    LineChart,
    #[serde(rename = "barChart")]
    BarChart,
    #[serde(rename = "areaChart")]
    AreaChart,
    #[serde(rename = "gauge")]
    Gauge,
    #[serde(rename = "heatmap")]
    Heatmap,
}

/// Chart library enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartLibrary {
    Recharts,
    Plotly,
}

impl ChartType {
    pub const ALL: [ChartType; 5] = [
        ChartType::LineChart,
        ChartType::BarChart,
        ChartType::AreaChart,
        ChartType::Gauge,
        ChartType::Heatmap,
    ];

    /// The rendering library for this chart type. Time-series, discrete and
    /// proportional charts render with Recharts; single-value and bucketed
    /// charts with Plotly. Every chart type maps to exactly one library.
    pub fn library(self) -> ChartLibrary {
        match self {
            ChartType::LineChart | ChartType::BarChart | ChartType::AreaChart => {
                ChartLibrary::Recharts
            }
            ChartType::Gauge | ChartType::Heatmap => ChartLibrary::Plotly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::LineChart => "lineChart",
            ChartType::BarChart => "barChart",
            ChartType::AreaChart => "areaChart",
            ChartType::Gauge => "gauge",
            ChartType::Heatmap => "heatmap",
        }
    }
}

impl ChartLibrary {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartLibrary::Recharts => "recharts",
            ChartLibrary::Plotly => "plotly",
        }
    }

    /// Chart types that render with this library.
    pub fn chart_types(self) -> Vec<ChartType> {
        ChartType::ALL
            .iter()
            .copied()
            .filter(|chart_type| chart_type.library() == self)
            .collect()
    }
}

/// Complete chart configuration for a chart type, in the wire shape used by
/// generated query specs.
pub fn chart_config(chart_type: ChartType) -> Value {
    json!({
        "chartType": chart_type.as_str(),
        "chartLibrary": chart_type.library().as_str(),
    })
}

/// All chart type wire values.
pub fn all_chart_types() -> Vec<&'static str> {
    ChartType::ALL.iter().map(|t| t.as_str()).collect()
}
