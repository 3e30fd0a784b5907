//! Chart descriptions parsed from the visualization capability.
//!
//! The capability hands back loosely-typed parameters; everything shape-
//! dependent is resolved here, once, so the renderer works from a tagged
//! union instead of re-inspecting JSON per trace.

use serde_json::{Map, Value};

use crate::error::{AssistantError, Result};

/// Chart family requested by the visualization capability.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartKind {
    Line,
    Bar,
    Other(String),
}

impl ChartKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "line" => ChartKind::Line,
            "bar" => ChartKind::Bar,
            other => ChartKind::Other(other.to_string()),
        }
    }
}

/// Series payload resolved once at the parse boundary.
///
/// The shape is decided by the first value in the map and must hold for
/// every entry. `None` marks a missing data point.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesData {
    /// x key to one scalar.
    Scalar(Vec<(String, Option<f64>)>),
    /// x key to named per-legend values, field order preserved.
    Keyed(Vec<(String, Vec<(String, Option<f64>)>)>),
    /// x key to positional per-legend values.
    Positional(Vec<(String, Vec<Option<f64>>)>),
}

impl SeriesData {
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(AssistantError::Render(format!(
                "series_data must be an object, got {}",
                json_kind(value)
            )));
        };
        let Some((_, first)) = map.iter().next() else {
            return Ok(SeriesData::Scalar(Vec::new()));
        };

        match first {
            Value::Object(_) => {
                let mut entries = Vec::with_capacity(map.len());
                for (x_key, entry) in map {
                    let Value::Object(fields) = entry else {
                        return Err(AssistantError::Render(format!(
                            "series_data entry {:?} is not an object",
                            x_key
                        )));
                    };
                    let mut values = Vec::with_capacity(fields.len());
                    for (name, field) in fields {
                        values.push((name.clone(), coerce_scalar(field)?));
                    }
                    entries.push((x_key.clone(), values));
                }
                Ok(SeriesData::Keyed(entries))
            }
            Value::Array(_) => {
                let mut entries = Vec::with_capacity(map.len());
                for (x_key, entry) in map {
                    let Value::Array(items) = entry else {
                        return Err(AssistantError::Render(format!(
                            "series_data entry {:?} is not an array",
                            x_key
                        )));
                    };
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(coerce_scalar(item)?);
                    }
                    entries.push((x_key.clone(), values));
                }
                Ok(SeriesData::Positional(entries))
            }
            _ => {
                let mut entries = Vec::with_capacity(map.len());
                for (x_key, entry) in map {
                    entries.push((x_key.clone(), coerce_scalar(entry)?));
                }
                Ok(SeriesData::Scalar(entries))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SeriesData::Scalar(entries) => entries.is_empty(),
            SeriesData::Keyed(entries) => entries.is_empty(),
            SeriesData::Positional(entries) => entries.is_empty(),
        }
    }

    /// X-axis keys in insertion order.
    pub fn x_keys(&self) -> Vec<&str> {
        match self {
            SeriesData::Scalar(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            SeriesData::Keyed(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            SeriesData::Positional(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
        }
    }
}

/// Parsed chart description from the visualization capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub legends: Vec<String>,
    pub series: SeriesData,
}

impl ChartSpec {
    /// Read a chart description out of capability parameters.
    ///
    /// `Ok(None)` means no chart was requested (`type` or `series_data`
    /// absent); a series payload that violates the contract is an error.
    pub fn from_parameters(parameters: &Map<String, Value>) -> Result<Option<Self>> {
        let Some(kind) = parameters.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        let Some(series_value) = parameters.get("series_data") else {
            return Ok(None);
        };

        let series = SeriesData::from_value(series_value)?;
        let legends = parameters
            .get("legends")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Self {
            kind: ChartKind::from_name(kind),
            x_axis_title: string_param(parameters, "xaxis_title"),
            y_axis_title: string_param(parameters, "yaxis_title"),
            legends,
            series,
        }))
    }
}

fn string_param(parameters: &Map<String, Value>, key: &str) -> String {
    parameters
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn coerce_scalar(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            AssistantError::Render(format!("Non-numeric series value {:?}", s))
        }),
        other => Err(AssistantError::Render(format!(
            "Unsupported series value of type {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
