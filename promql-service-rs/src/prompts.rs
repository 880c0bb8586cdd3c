// promql-service-rs/src/prompts.rs
// Prompt text for the chat-completion calls. The system prompt pins down the
// exact JSON contract the generator must produce; the chart-type/library
// lines are spliced in from the chart_config mapping so prompt and lookup
// table cannot drift apart.

use once_cell::sync::Lazy;

use crate::chart_config::{ChartLibrary, ChartType};

fn library_line(library: ChartLibrary) -> String {
    let types: Vec<&'static str> = library
        .chart_types()
        .into_iter()
        .map(ChartType::as_str)
        .collect();
    format!("  - {}: {}", library.as_str(), types.join(", "))
}

pub static SYSTEM_PROMPT: Lazy<String> = Lazy::new(|| {
    format!(
        r#"You are an expert in Prometheus and PromQL.
- Always follow PromQL best practices.
- For counters, use rate().
- For latency, use histogram_quantile().
- Return ONLY a valid JSON object with the following structure:
{{
  "query": "your_promql_query_here",
  "start": current_unix_timestamp_in_seconds,
  "end": current_unix_timestamp_in_seconds_or_range_end,
  "step": "time_interval_like_60s",
  "chartConfig": {{
    "chartType": "choose_from_enum_values",
    "chartLibrary": "recharts_or_plotly"
  }}
}}

- Use **current Unix timestamps** for start and end by default if not specified.
- Use reasonable default time ranges (e.g., last 1 hour) unless specified.
- Use appropriate step intervals (e.g., 60s for short ranges, 5m for longer ranges).
- For chartConfig, choose the chartType from these enum values:
  - "lineChart" (use with "recharts") for time series trends (CPU, memory, request rates)
  - "barChart" (use with "recharts") for discrete values (top N requests, counts by label)
  - "areaChart" (use with "recharts") when stacking or showing proportions (traffic split, resource usage)
  - "gauge" (use with "plotly") for single-point metrics (current values, availability percentages)
  - "heatmap" (use with "plotly") for latency histograms or bucketed data
- Chart library mapping (MUST follow these exact mappings):
{recharts_line}
{plotly_line}
- Do not include any text outside the JSON object.
- Ensure that start and end are **actual numeric Unix timestamps**, not placeholder strings.
"#,
        recharts_line = library_line(ChartLibrary::Recharts),
        plotly_line = library_line(ChartLibrary::Plotly),
    )
});

pub const EXPLAIN_SYSTEM_PROMPT: &str = "You are an expert in Prometheus and PromQL. \
Explain queries in plain language for engineers who do not know PromQL. \
Keep the explanation short and concrete.";

pub fn query_template(description: &str) -> String {
    format!(
        "Generate a complete Prometheus query payload for: {}",
        description
    )
}

pub fn explain_template(query: &str) -> String {
    format!("Explain this PromQL query in simple terms: {}", query)
}
