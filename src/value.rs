//! JSON-like values for terraform outputs and resource attributes
//!
//! Terraform hands back arbitrary nested JSON. Rather than poking at
//! `serde_json::Value` everywhere, the engine works with this closed type and
//! its two explicit operations: [`Value::render`] (how a value looks when
//! substituted into a command or compared as text) and [`Value::matches`]
//! (the coercion rules used by inventory assertions).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named terraform outputs, as returned by `terraform output -json`
pub type OutputSnapshot = BTreeMap<String, Value>;

/// A JSON-like value
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Render the value as interpolated text
    ///
    /// Integral numbers drop the decimal point, a one-element array renders
    /// as its element, longer arrays are comma-joined. Objects render as an
    /// opaque `{k: v, ...}` string.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) if items.len() == 1 => items[0].render(),
            Value::Array(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.render()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }

    /// Type-aware equality with `self` as the expected value
    ///
    /// - expected string: compared against the actual value's rendering
    /// - expected number: numeric comparison against a numeric actual
    /// - expected bool: only equal to a bool actual
    /// - anything else: rendering equality
    pub fn matches(&self, actual: &Value) -> bool {
        match (self, actual) {
            (Value::String(expected), actual) => *expected == actual.render(),
            (Value::Number(expected), Value::Number(actual)) => expected == actual,
            (Value::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Value::Bool(_), _) => false,
            (expected, actual) => expected.render() == actual.render(),
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        // Display for f64 is already the shortest round-trip representation
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::Value::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_numbers() {
        assert_eq!(Value::Number(42.0).render(), "42");
        assert_eq!(Value::Number(-7.0).render(), "-7");
        assert_eq!(Value::Number(1.5).render(), "1.5");
        assert_eq!(Value::Number(0.1).render(), "0.1");
    }

    #[test]
    fn test_render_arrays() {
        let single = Value::from(json!(["only"]));
        assert_eq!(single.render(), "only");
        let many = Value::from(json!([10, 20, "x", true]));
        assert_eq!(many.render(), "10,20,x,true");
    }

    #[test]
    fn test_matches_coercion_rules() {
        // expected string against non-string actuals
        assert!(Value::from("10").matches(&Value::Number(10.0)));
        assert!(Value::from("true").matches(&Value::Bool(true)));
        // integer actual coerces to float
        assert!(Value::Number(3.0).matches(&Value::from(json!(3))));
        // bools only match bools
        assert!(!Value::Bool(true).matches(&Value::from("true")));
        assert!(Value::Bool(false).matches(&Value::Bool(false)));
        // number vs string falls back to rendering
        assert!(Value::Number(5.0).matches(&Value::from("5")));
        assert!(!Value::Number(5.0).matches(&Value::from("5.0")));
    }

    #[test]
    fn test_deserialize_from_yaml_and_json() {
        let from_yaml: Value = serde_yaml::from_str("{a: 1, b: [x, 2.5], c: null}").unwrap();
        let from_json: Value =
            serde_json::from_str(r#"{"a": 1, "b": ["x", 2.5], "c": null}"#).unwrap();
        assert_eq!(from_yaml, from_json);
        assert_eq!(
            from_yaml.as_object().unwrap().get("a"),
            Some(&Value::Number(1.0))
        );
    }

    #[test]
    fn test_serialize_integral_numbers_as_integers() {
        let value = Value::from(json!({"n": 3, "f": 1.25}));
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"f":1.25,"n":3}"#);
    }
}
