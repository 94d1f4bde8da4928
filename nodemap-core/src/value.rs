use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::StoreError;

/// A value read from or written to a node.
///
/// Tuples are table rows (and tuples of scalars); arrays are homogeneous
/// sequences such as multi-row reads or array rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn tuple<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Returns the elements of a tuple or array.
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Orders two scalars, promoting integers to floats when mixed.
    ///
    /// Booleans only compare with booleans; anything else is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::array(v)
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self {
        Value::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Value {
    fn from((a, b, c): (A, B, C)) -> Self {
        Value::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

/// Element type of an array node or a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atom {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl Atom {
    /// The value new fixed-size nodes are filled with.
    pub fn default_value(self) -> Value {
        match self {
            Atom::Bool => Value::Bool(false),
            Atom::Int32 | Atom::Int64 => Value::Int(0),
            Atom::Float32 | Atom::Float64 => Value::Float(0.0),
        }
    }

    /// Picks the widest atom able to hold a scalar.
    pub fn infer(value: &Value) -> Option<Atom> {
        match value {
            Value::Bool(_) => Some(Atom::Bool),
            Value::Int(_) => Some(Atom::Int64),
            Value::Float(_) => Some(Atom::Float64),
            _ => None,
        }
    }

    /// Converts a scalar into this atom's representation.
    pub fn coerce(self, value: &Value) -> Result<Value, StoreError> {
        let mismatch = || StoreError::TypeMismatch {
            expected: format!("{self:?}"),
            found: value.clone(),
        };
        match (self, value) {
            (Atom::Bool, Value::Bool(v)) => Ok(Value::Bool(*v)),
            (Atom::Int32, Value::Int(v)) => i32::try_from(*v)
                .map(|_| Value::Int(*v))
                .map_err(|_| mismatch()),
            (Atom::Int64, Value::Int(v)) => Ok(Value::Int(*v)),
            (Atom::Float32, Value::Int(v)) => Ok(Value::Float(*v as f32 as f64)),
            (Atom::Float32, Value::Float(v)) => Ok(Value::Float(*v as f32 as f64)),
            (Atom::Float64, Value::Int(v)) => Ok(Value::Float(*v as f64)),
            (Atom::Float64, Value::Float(v)) => Ok(Value::Float(*v)),
            _ => Err(mismatch()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

/// Ordered column layout of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description(IndexMap<String, Atom>);

impl Description {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, keeping declaration order.
    pub fn field(mut self, name: impl Into<String>, atom: Atom) -> Self {
        self.0.insert(name.into(), atom);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position and atom of a column.
    pub fn column(&self, name: &str) -> Option<(usize, Atom)> {
        self.0.get_full(name).map(|(idx, _, atom)| (idx, *atom))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Validates a row against the layout, coercing each column.
    pub fn coerce_row(&self, row: &Value) -> Result<Value, StoreError> {
        let mismatch = || StoreError::TypeMismatch {
            expected: format!("record of {} fields", self.0.len()),
            found: row.clone(),
        };
        let items = row.items().ok_or_else(mismatch)?;
        if items.len() != self.0.len() {
            return Err(mismatch());
        }
        let fields = self
            .0
            .values()
            .zip(items)
            .map(|(atom, item)| atom.coerce(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Tuple(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_coercion() {
        assert_eq!(Atom::Float64.coerce(&Value::Int(3)).unwrap(), Value::Float(3.0));
        assert!(Atom::Int32.coerce(&Value::Int(i64::MAX)).is_err());
        assert!(Atom::Int64.coerce(&Value::Float(1.5)).is_err());
        assert!(Atom::Bool.coerce(&Value::Int(1)).is_err());
    }

    #[test]
    fn mixed_comparison_promotes() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Bool(true).compare(&Value::Int(1)), None);
    }

    #[test]
    fn description_coerces_rows() {
        let desc = Description::new()
            .field("A", Atom::Int64)
            .field("B", Atom::Float64);

        let row = desc.coerce_row(&Value::from((1, 2))).unwrap();
        assert_eq!(row, Value::Tuple(vec![Value::Int(1), Value::Float(2.0)]));
        assert!(desc.coerce_row(&Value::from((1, 2, 3))).is_err());
        assert!(desc.coerce_row(&Value::Int(1)).is_err());
        assert_eq!(desc.column("B"), Some((1, Atom::Float64)));
    }
}
