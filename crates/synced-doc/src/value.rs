//! Primitive leaf values.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// A primitive leaf: the only values a `con` node can hold.
///
/// Numbers are kept as [`serde_json::Number`], which is `Eq + Hash`, so
/// primitives can be compared and used as map keys by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Primitive {
    /// Convert a JSON scalar into a primitive. Arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Primitive::Null),
            Value::Bool(b) => Some(Primitive::Bool(*b)),
            Value::Number(n) => Some(Primitive::Number(n.clone())),
            Value::String(s) => Some(Primitive::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Number(n) => Value::Number(n.clone()),
            Primitive::String(s) => Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<i32> for Primitive {
    fn from(n: i32) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<u64> for Primitive {
    fn from(n: u64) -> Self {
        Primitive::Number(n.into())
    }
}

/// Non-finite floats have no JSON representation and become `Null`.
impl From<f64> for Primitive {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Primitive::Null, Primitive::Number)
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_string())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_convert_both_ways() {
        for v in [json!(null), json!(true), json!(3), json!(2.5), json!("x")] {
            let p = Primitive::from_json(&v).unwrap();
            assert_eq!(p.to_json(), v);
        }
        assert!(Primitive::from_json(&json!([1])).is_none());
        assert!(Primitive::from_json(&json!({})).is_none());
    }

    #[test]
    fn nan_becomes_null() {
        assert_eq!(Primitive::from(f64::NAN), Primitive::Null);
    }

    #[test]
    fn serde_is_untagged() {
        let p: Primitive = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(p, Primitive::from("abc"));
        assert_eq!(serde_json::to_string(&Primitive::from(7)).unwrap(), "7");
        let n: Primitive = serde_json::from_str("null").unwrap();
        assert_eq!(n, Primitive::Null);
    }
}
