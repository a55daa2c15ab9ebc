//! Dynamically typed values for graphs whose nodes carry mixed kinds of data.
//!
//! A lifted function takes its arguments as a `Vec<A>`, so they all share
//! one type. When a function's parameters differ in type (a process output
//! and a number, say), [`Value`] is the element type to use.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A dynamically typed value with host-style coercions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// A string value.
    String(String),
    /// A numeric value (always f64).
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// An array of values.
    Array(Vec<Value>),
    /// An object with string keys.
    Object(HashMap<String, Value>),
}

impl Value {
    /// Coerce this value to a string.
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.is_nan() {
                    "NaN".to_string()
                } else if n.is_infinite() {
                    if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
                } else if *n == n.trunc() && n.abs() < 1e15 {
                    // Integer-like numbers without decimal point
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.to_string_value()).collect();
                items.join(",")
            }
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Coerce this value to a boolean, the way a conditional test would.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Array(_) => true,
            Value::Object(_) => true,
        }
    }

    /// Coerce this value to a number.
    ///
    /// Strings are trimmed and parsed; anything unparseable is NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(_) | Value::Object(_) => f64::NAN,
        }
    }

    /// Render this value as pretty-printed JSON.
    ///
    /// Non-finite numbers have no JSON form and render as `null`.
    pub fn to_json(&self) -> String {
        let json = JsonValue::from(self);
        serde_json::to_string_pretty(&json).unwrap_or_else(|_| "null".to_string())
    }
}

impl From<&Value> for JsonValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(arr) => JsonValue::Array(arr.iter().map(JsonValue::from).collect()),
            Value::Object(obj) => JsonValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), JsonValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::from("").to_bool());
        assert!(Value::from("0").to_bool());
        assert!(!Value::from(0).to_bool());
        assert!(!Value::Number(f64::NAN).to_bool());
        assert!(Value::from(-1).to_bool());
        assert!(Value::Array(vec![]).to_bool());
        assert!(Value::Object(HashMap::new()).to_bool());
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::from(" 15\n").to_number(), 15.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("evening").to_number().is_nan());
        assert_eq!(Value::from(true).to_number(), 1.0);
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::from(vec![Value::from(1), Value::from("a")]).to_string(), "1,a");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_to_json() {
        let value = Value::Object(HashMap::from([
            ("greeting".to_string(), Value::from("hi")),
            ("tags".to_string(), Value::from(vec![Value::from(1), Value::Null])),
            ("ratio".to_string(), Value::Number(f64::NAN)),
        ]));

        let json: JsonValue = serde_json::from_str(&value.to_json()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"greeting": "hi", "tags": [1.0, null], "ratio": null})
        );
    }
}
