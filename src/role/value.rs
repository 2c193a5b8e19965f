//! Scalar values carried by restrictions and tool-group options.
//!
//! Role files are hand-written YAML, so `"10"`, `10` and `10.0` should all be
//! understood. String inputs are coerced in order: bool, integer, float, text.

use super::RoleParseError;
use serde::{Serialize, Serializer};
use std::fmt;

/// A loosely-typed scalar with automatic coercion from strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Coerce a raw string into the most specific scalar it represents.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        let unquoted = strip_quotes(trimmed);
        if unquoted.len() != trimmed.len() {
            // Explicitly quoted values stay text.
            return ScalarValue::Text(unquoted.to_string());
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => return ScalarValue::Bool(true),
            "false" | "no" | "off" => return ScalarValue::Bool(false),
            _ => {}
        }

        if let Ok(value) = trimmed.parse::<i64>() {
            return ScalarValue::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return ScalarValue::Float(value);
        }
        ScalarValue::Text(trimmed.to_string())
    }

    /// Convert a YAML scalar. Strings go through [`ScalarValue::coerce`].
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self, RoleParseError> {
        match value {
            serde_yaml::Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ScalarValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(ScalarValue::Float(f))
                } else {
                    Err(RoleParseError::InvalidValue(n.to_string()))
                }
            }
            serde_yaml::Value::String(s) => Ok(ScalarValue::coerce(s)),
            other => Err(RoleParseError::InvalidValue(format!("{:?}", other))),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            ScalarValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Non-negative integer view, used for counters and limits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "integer",
            ScalarValue::Float(_) => "float",
            ScalarValue::Text(_) => "string",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Int(i) => serializer.serialize_i64(*i),
            ScalarValue::Float(x) => serializer.serialize_f64(*x),
            ScalarValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerces_booleans_case_insensitively() {
        assert_eq!(ScalarValue::coerce("true"), ScalarValue::Bool(true));
        assert_eq!(ScalarValue::coerce("False"), ScalarValue::Bool(false));
        assert_eq!(ScalarValue::coerce(" yes "), ScalarValue::Bool(true));
    }

    #[test]
    fn test_coerces_numbers() {
        assert_eq!(ScalarValue::coerce("10"), ScalarValue::Int(10));
        assert_eq!(ScalarValue::coerce("-3"), ScalarValue::Int(-3));
        assert_eq!(ScalarValue::coerce("2.5"), ScalarValue::Float(2.5));
    }

    #[test]
    fn test_falls_back_to_text() {
        assert_eq!(
            ScalarValue::coerce("*.py"),
            ScalarValue::Text("*.py".to_string())
        );
    }

    #[test]
    fn test_quoted_values_stay_text() {
        assert_eq!(
            ScalarValue::coerce("\"10\""),
            ScalarValue::Text("10".to_string())
        );
    }

    #[test]
    fn test_integer_views() {
        assert_eq!(ScalarValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(ScalarValue::Float(3.5).as_i64(), None);
        assert_eq!(ScalarValue::Int(-1).as_u64(), None);
        assert_eq!(ScalarValue::Int(7).as_u64(), Some(7));
    }

    #[test]
    fn test_from_yaml_coerces_strings() {
        let value = serde_yaml::Value::String("true".to_string());
        assert_eq!(ScalarValue::from_yaml(&value).unwrap(), ScalarValue::Bool(true));

        let seq = serde_yaml::Value::Sequence(vec![]);
        assert!(ScalarValue::from_yaml(&seq).is_err());
    }
}
