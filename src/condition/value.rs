//! Runtime values of the condition expression language.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::schema::ParamType;

use super::ConditionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Timestamp(DateTime<Utc>),
    Duration(chrono::Duration),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
        }
    }

    pub fn as_bool(&self) -> Result<bool, ConditionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ConditionError::TypeMismatch {
                expected: "bool",
                found: other.type_name(),
            }),
        }
    }

    /// Partial order used by `<`, `<=`, `>`, `>=`. Only numeric,
    /// timestamp, and duration types support ordering.
    pub fn partial_cmp_checked(&self, other: &Value) -> Result<Ordering, ConditionError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => {
                a.partial_cmp(b).ok_or(ConditionError::UnsupportedOperator {
                    op: "<",
                    left: "double",
                    right: "double",
                })
            }
            (Value::Int(a), Value::Double(b)) => (*a as f64)
                .partial_cmp(b)
                .ok_or(ConditionError::UnsupportedOperator {
                    op: "<",
                    left: "int",
                    right: "double",
                }),
            (Value::Double(a), Value::Int(b)) => a
                .partial_cmp(&(*b as f64))
                .ok_or(ConditionError::UnsupportedOperator {
                    op: "<",
                    left: "double",
                    right: "int",
                }),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Ok(a.cmp(b)),
            (a, b) => Err(ConditionError::UnsupportedOperator {
                op: "<",
                left: a.type_name(),
                right: b.type_name(),
            }),
        }
    }

    /// Coerce a JSON value arriving from a context map into the declared
    /// parameter type. Failure to coerce is a type error.
    pub fn coerce(json: &serde_json::Value, expected: ParamType) -> Result<Value, ConditionError> {
        match (expected, json) {
            (ParamType::Bool, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
            (ParamType::Int, serde_json::Value::Number(n)) => n
                .as_i64()
                .map(Value::Int)
                .ok_or(ConditionError::TypeMismatch {
                    expected: "int",
                    found: "double",
                }),
            (ParamType::Double, serde_json::Value::Number(n)) => n
                .as_f64()
                .map(Value::Double)
                .ok_or(ConditionError::TypeMismatch {
                    expected: "double",
                    found: "number",
                }),
            (ParamType::String, serde_json::Value::String(s)) => Ok(Value::String(s.clone())),
            (ParamType::Timestamp, serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| ConditionError::TypeMismatch {
                    expected: "timestamp",
                    found: "string",
                }),
            (ParamType::Duration, serde_json::Value::String(s)) => {
                parse_duration(s).map(Value::Duration)
            }
            (ParamType::List, serde_json::Value::Array(items)) => {
                // Element type is not separately declared; elements are
                // coerced structurally from JSON.
                Ok(Value::List(items.iter().map(Value::from_json_untyped).collect()))
            }
            (ParamType::Map, serde_json::Value::Object(map)) => Ok(Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json_untyped(v)))
                    .collect(),
            )),
            (expected, found) => Err(ConditionError::TypeMismatch {
                expected: expected.label(),
                found: json_type_name(found),
            }),
        }
    }

    /// Structural conversion used for list/map elements whose declared
    /// type is the container's, not each element's.
    fn from_json_untyped(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Double(n.as_f64().unwrap_or_default())),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json_untyped).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json_untyped(v)))
                    .collect(),
            ),
            serde_json::Value::Null => Value::Bool(false),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => write!(f, "{items:?}"),
            Value::Map(map) => write!(f, "{map:?}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Duration(d) => write!(f, "{d}"),
        }
    }
}

impl ParamType {
    pub fn label(self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Double => "double",
            ParamType::Timestamp => "timestamp",
            ParamType::Duration => "duration",
            ParamType::List => "list",
            ParamType::Map => "map",
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Parses `"90s"` or `"1h30m"`-style durations.
pub fn parse_duration(input: &str) -> Result<chrono::Duration, ConditionError> {
    let bad = || ConditionError::TypeMismatch {
        expected: "duration",
        found: "string",
    };

    if let Some(secs) = input.strip_suffix('s').filter(|rest| rest.chars().all(|c| c.is_ascii_digit())) {
        let secs: i64 = secs.parse().map_err(|_| bad())?;
        return Ok(chrono::Duration::seconds(secs));
    }

    let mut total = chrono::Duration::zero();
    let mut number = String::new();
    let mut saw_unit = false;
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            if number.is_empty() {
                return Err(bad());
            }
            let amount: i64 = number.parse().map_err(|_| bad())?;
            number.clear();
            let unit = match ch {
                'h' => chrono::Duration::hours(amount),
                'm' => chrono::Duration::minutes(amount),
                's' => chrono::Duration::seconds(amount),
                _ => return Err(bad()),
            };
            total = total + unit;
            saw_unit = true;
        }
    }
    if !number.is_empty() || !saw_unit {
        return Err(bad());
    }
    Ok(total)
}
