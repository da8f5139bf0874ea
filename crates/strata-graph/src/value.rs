//! Fully resolved configuration values.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// The scalarized form of a graph node, as returned by `resolve`.
///
/// Maps keep key order: keys inherited from earlier layers come first,
/// followed by keys introduced by later layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Interpret an unquoted scalar.
    ///
    /// `yes`/`true`/`on` and `no`/`false`/`off` (any case) become booleans,
    /// then signed integers are tried, anything else stays a string.
    pub fn box_scalar(text: &str) -> Value {
        match text.to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" => return Value::Bool(true),
            "no" | "false" | "off" => return Value::Bool(false),
            _ => {}
        }
        match text.parse::<i64>() {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::String(text.to_string()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Text used when the value is spliced into a string template.
    ///
    /// Sequences and mappings have no interpolated form.
    pub fn interpolate(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::List(_) | Value::Map(_) => None,
            other => Some(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxing_order() {
        assert_eq!(Value::box_scalar("yes"), Value::Bool(true));
        assert_eq!(Value::box_scalar("On"), Value::Bool(true));
        assert_eq!(Value::box_scalar("FALSE"), Value::Bool(false));
        assert_eq!(Value::box_scalar("off"), Value::Bool(false));
        assert_eq!(Value::box_scalar("-42"), Value::Integer(-42));
        assert_eq!(Value::box_scalar("1.5"), Value::String("1.5".into()));
        assert_eq!(Value::box_scalar("null"), Value::String("null".into()));
        assert_eq!(Value::box_scalar(""), Value::String(String::new()));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(Value::from(vec![1i64]).is_truthy());
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(Value::Float(2.5).interpolate().as_deref(), Some("2.5"));
        assert_eq!(Value::Float(2.0).interpolate().as_deref(), Some("2.0"));
        assert_eq!(Value::Bool(true).interpolate().as_deref(), Some("true"));
        assert_eq!(Value::Null.interpolate().as_deref(), Some(""));
        assert_eq!(Value::from(vec!["a"]).interpolate(), None);
    }

    #[test]
    fn test_serialize_untagged() {
        let mut entries = IndexMap::new();
        entries.insert("b".to_string(), Value::from(vec![1i64, 2]));
        entries.insert("a".to_string(), Value::Null);
        let json = serde_json::to_string(&Value::Map(entries)).unwrap();
        assert_eq!(json, r#"{"b":[1,2],"a":null}"#);
    }
}
