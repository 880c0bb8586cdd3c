//! Parsing, field validation and splitting of generated query specs.
//!
//! The generator returns raw text. Each type here encodes how far a spec has
//! made it through the checks: `ParsedSpec` decoded as a JSON object,
//! `ValidatedSpec` passed the required-field check for a mode, and
//! `SplitSpec` separated into the execution payload and the presentation
//! (chart) payload. The execution payload is the only part that may reach
//! the Prometheus connector.

use serde_json::{Map, Value};
use thiserror::Error;

pub type SpecResult<T> = Result<T, SpecError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    /// Generator output did not decode as a JSON object.
    #[error("generated spec is not valid JSON: {0}")]
    Malformed(String),

    /// Parsed object is missing required fields; every missing field is
    /// named, not just the first.
    #[error("generated spec is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

pub const EXECUTION_FIELDS: [&str; 4] = ["query", "start", "end", "step"];
pub const CHART_CONFIG_FIELD: &str = "chartConfig";

/// Which fields a spec must carry and whether the chart payload is split
/// out. The required set is data, not code: the generator contract has
/// changed shape before and will again.
#[derive(Debug, Clone)]
pub struct ValidationMode {
    required: Vec<&'static str>,
    split_chart_config: bool,
}

impl ValidationMode {
    /// Execution fields only; chart configuration is neither required nor
    /// expected.
    pub fn execution_only() -> Self {
        Self {
            required: EXECUTION_FIELDS.to_vec(),
            split_chart_config: false,
        }
    }

    /// Execution fields plus a required chart configuration that gets split
    /// off before execution.
    pub fn with_chart_config() -> Self {
        let mut required = EXECUTION_FIELDS.to_vec();
        required.push(CHART_CONFIG_FIELD);
        Self {
            required,
            split_chart_config: true,
        }
    }

    pub fn required_fields(&self) -> &[&'static str] {
        &self.required
    }

    pub fn splits_chart_config(&self) -> bool {
        self.split_chart_config
    }
}

/// A generator output successfully decoded as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    fields: Map<String, Value>,
}

impl ParsedSpec {
    pub fn parse(raw: &str) -> SpecResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| SpecError::Malformed(err.to_string()))?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(SpecError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Names of required fields absent from this spec, in required-set order.
    pub fn missing_fields(&self, mode: &ValidationMode) -> Vec<String> {
        mode.required_fields()
            .iter()
            .filter(|field| !self.fields.contains_key(**field))
            .map(|field| field.to_string())
            .collect()
    }

    pub fn validate(self, mode: &ValidationMode) -> SpecResult<ValidatedSpec> {
        let missing = self.missing_fields(mode);
        if !missing.is_empty() {
            return Err(SpecError::MissingFields(missing));
        }
        Ok(ValidatedSpec {
            fields: self.fields,
        })
    }

    /// Lenient split without the field check, used to capture whatever was
    /// parsed when validation fails.
    pub fn split(self) -> SplitSpec {
        split_fields(self.fields)
    }
}

/// A spec that passed the required-field check for some mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    fields: Map<String, Value>,
}

impl ValidatedSpec {
    pub fn split(self) -> SplitSpec {
        split_fields(self.fields)
    }
}

/// The two halves of a query spec: what goes to the Prometheus connector and
/// what stays behind for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSpec {
    pub execution: Map<String, Value>,
    pub chart_config: Value,
}

/// Remove the chart payload (an absent one defaults to an empty object; the
/// split is lenient even where the field check is strict) and normalize the
/// time bounds of the remainder.
fn split_fields(mut fields: Map<String, Value>) -> SplitSpec {
    let chart_config = fields
        .remove(CHART_CONFIG_FIELD)
        .unwrap_or_else(|| Value::Object(Map::new()));
    normalize_time_bounds(&mut fields);
    SplitSpec {
        execution: fields,
        chart_config,
    }
}

/// `start`/`end` arrive either as numbers or numeric strings. Rewrite
/// numeric strings as JSON numbers here so nothing downstream has to cope
/// with both shapes. Anything else passes through untouched.
fn normalize_time_bounds(fields: &mut Map<String, Value>) {
    for field in ["start", "end"] {
        let normalized = match fields.get(field) {
            Some(Value::String(raw)) => {
                let trimmed = raw.trim();
                if let Ok(seconds) = trimmed.parse::<i64>() {
                    Some(Value::from(seconds))
                } else if let Ok(seconds) = trimmed.parse::<f64>() {
                    serde_json::Number::from_f64(seconds).map(Value::Number)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(value) = normalized {
            fields.insert(field.to_string(), value);
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
