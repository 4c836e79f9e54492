//! String-to-typed-value conversion shared by prompts and environment overrides.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// A converted scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Scalar view of a JSON leaf; `None` for null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => b.into(),
            Value::Int(i) => i.into(),
            Value::Float(f) => f.into(),
            Value::Str(s) => s.into(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

type CustomFn = dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync;

/// Conversion applied to a non-empty raw string.
#[derive(Clone)]
pub enum Converter {
    Str,
    Bool,
    Int,
    Float,
    Custom(Arc<CustomFn>),
}

impl Converter {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Converter matching the kind of `default`, or string identity without one.
    pub fn inferred_from(default: Option<&Value>) -> Self {
        match default {
            Some(Value::Bool(_)) => Self::Bool,
            Some(Value::Int(_)) => Self::Int,
            Some(Value::Float(_)) => Self::Float,
            Some(Value::Str(_)) | None => Self::Str,
        }
    }

    fn apply(&self, raw: &str) -> Result<Value, CommandError> {
        match self {
            Self::Str => Ok(Value::Str(raw.to_string())),
            Self::Bool => parse_bool(raw).map(Value::Bool),
            Self::Int => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| CommandError::invalid_value(raw, e)),
            Self::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| CommandError::invalid_value(raw, e)),
            Self::Custom(f) => f(raw).map_err(|e| CommandError::invalid_value(raw, e)),
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("Str"),
            Self::Bool => f.write_str("Bool"),
            Self::Int => f.write_str("Int"),
            Self::Float => f.write_str("Float"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parse a yes/no style literal, case-insensitively.
pub fn parse_bool(raw: &str) -> Result<bool, CommandError> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        _ => Err(CommandError::invalid_value(
            raw,
            format!("{raw} cannot be converted to bool"),
        )),
    }
}

/// Convert `value` using `converter`, falling back to `default` for empty input.
///
/// Without an explicit converter the kind of `default` decides; with neither,
/// the raw string is returned as-is. An empty `value` returns `default`
/// unchanged and never reaches the converter.
pub fn convert(
    value: &str,
    default: Option<Value>,
    converter: Option<Converter>,
) -> Result<Option<Value>, CommandError> {
    let converter = converter.unwrap_or_else(|| Converter::inferred_from(default.as_ref()));
    if value.is_empty() {
        return Ok(default);
    }
    converter.apply(value).map(Some)
}
