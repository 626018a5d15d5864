//! Runtime value types for filter operands.

use crate::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A runtime value held by an object member or used as a filter operand.
///
/// This enum covers every scalar the engine can index and compare. Reference
/// members hold [`Value::Id`] (single reference) or [`Value::IdArray`]
/// (multi-valued reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value. Sorts before every other value in ascending order.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Reference to another object.
    Id(ObjectId),
    /// Multi-valued reference to other objects.
    IdArray(Vec<ObjectId>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an object reference.
    pub fn as_id(&self) -> Option<ObjectId> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// The object references held by this value, if any.
    ///
    /// A single reference yields one id, a multi-valued reference yields all
    /// of them, anything else yields an empty slice-like result.
    pub fn ids(&self) -> Vec<ObjectId> {
        match self {
            Value::Id(id) => vec![*id],
            Value::IdArray(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Compare two values, returning their ordering if comparable.
    ///
    /// Only values of the same kind are ordered — kinds sort into disjoint
    /// groups in the engine's indexes, so cross-kind comparisons (including
    /// `Int` against `Float`) yield `None` here too. NaN floats are likewise
    /// unordered. `Null` is not ordered here — the executors apply their own
    /// null rule.
    pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
            (Value::Id(x), Value::Id(y)) => Some(x.cmp(y)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Id(id) => write!(f, "{id}"),
            Value::IdArray(ids) => {
                write!(f, "[")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Id(v)
    }
}

impl From<Vec<ObjectId>> for Value {
    fn from(v: Vec<ObjectId>) -> Self {
        Value::IdArray(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::Int(42).as_f64(), Some(42.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Id(ObjectId::new(7)).as_id(), Some(ObjectId::new(7)));
    }

    #[test]
    fn test_conversions() {
        let v: Value = 42i64.into();
        assert_eq!(v, Value::Int(42));

        let v: Value = "hello".into();
        assert_eq!(v, Value::String("hello".into()));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let v: Value = ObjectId::new(3).into();
        assert_eq!(v, Value::Id(ObjectId::new(3)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::compare(&Value::Int(1), &Value::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::compare(&Value::String("a".into()), &Value::String("b".into())),
            Some(Ordering::Less)
        );
        // Kinds are disjoint: cross-kind values are not comparable
        assert_eq!(Value::compare(&Value::Int(3), &Value::Float(2.5)), None);
        assert_eq!(Value::compare(&Value::Int(1), &Value::String("1".into())), None);
        assert_eq!(Value::compare(&Value::Null, &Value::Int(1)), None);
    }

    #[test]
    fn test_ids() {
        assert_eq!(Value::Id(ObjectId::new(1)).ids(), vec![ObjectId::new(1)]);
        assert_eq!(
            Value::IdArray(vec![ObjectId::new(1), ObjectId::new(2)]).ids().len(),
            2
        );
        assert!(Value::Int(1).ids().is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let values = vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(std::f64::consts::PI),
            Value::String("hello world".into()),
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::Id(ObjectId::new(9)),
            Value::IdArray(vec![ObjectId::new(1), ObjectId::new(2)]),
        ];

        for value in values {
            let json = serde_json::to_string(&value).unwrap();
            let back: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value, back);
        }
    }
}
