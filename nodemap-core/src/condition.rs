use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::{Description, Value};

/// Named values a condition can refer to through [`Operand::Var`].
pub type CondVars = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Column(String),
    Literal(Value),
    Var(String),
}

/// A row filter for [`Store::read_where`](crate::Store::read_where).
///
/// Built from [`col`]: `col("A").gt(0).and(col("A").le(1000))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare {
        column: String,
        op: CmpOp,
        operand: Operand,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

/// Starts a comparison on a table column.
pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

pub struct Column(String);

impl Column {
    fn cmp(self, op: CmpOp, operand: impl Into<Operand>) -> Condition {
        Condition::Compare {
            column: self.0,
            op,
            operand: operand.into(),
        }
    }

    pub fn eq(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Eq, operand)
    }

    pub fn ne(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Ne, operand)
    }

    pub fn lt(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Lt, operand)
    }

    pub fn le(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Le, operand)
    }

    pub fn gt(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Gt, operand)
    }

    pub fn ge(self, operand: impl Into<Operand>) -> Condition {
        self.cmp(CmpOp::Ge, operand)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(value.into())
                }
            }
        )*
    };
}

literal_operand!(bool, i32, i64, f32, f64, &str, String, Value);

/// Refers to a bound variable instead of a literal.
pub fn var(name: impl Into<String>) -> Operand {
    Operand::Var(name.into())
}

/// Compares against another column of the same row.
pub fn column(name: impl Into<String>) -> Operand {
    Operand::Column(name.into())
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Evaluates the condition against one table row.
    pub fn matches(
        &self,
        description: &Description,
        row: &Value,
        vars: &CondVars,
    ) -> Result<bool, StoreError> {
        match self {
            Condition::Compare {
                column,
                op,
                operand,
            } => {
                let left = field(description, row, column)?;
                let right = match operand {
                    Operand::Column(name) => field(description, row, name)?,
                    Operand::Literal(value) => value,
                    Operand::Var(name) => vars
                        .get(name)
                        .ok_or_else(|| StoreError::UnboundVariable(name.clone()))?,
                };
                match left.compare(right) {
                    Some(ordering) => Ok(op.holds(ordering)),
                    // NaN on either side: only `!=` holds.
                    None if left.as_f64().is_some() && right.as_f64().is_some() => {
                        Ok(*op == CmpOp::Ne)
                    }
                    None => Err(StoreError::TypeMismatch {
                        expected: format!("a value comparable with column {column}"),
                        found: right.clone(),
                    }),
                }
            }
            Condition::And(a, b) => {
                Ok(a.matches(description, row, vars)? && b.matches(description, row, vars)?)
            }
            Condition::Or(a, b) => {
                Ok(a.matches(description, row, vars)? || b.matches(description, row, vars)?)
            }
            Condition::Not(inner) => Ok(!inner.matches(description, row, vars)?),
        }
    }
}

fn field<'a>(description: &Description, row: &'a Value, name: &str) -> Result<&'a Value, StoreError> {
    let (idx, _) = description
        .column(name)
        .ok_or_else(|| StoreError::UnknownField(name.to_string()))?;
    row.items()
        .and_then(|items| items.get(idx))
        .ok_or_else(|| StoreError::TypeMismatch {
            expected: format!("record with column {name}"),
            found: row.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Atom;

    fn layout() -> Description {
        Description::new()
            .field("A", Atom::Int64)
            .field("B", Atom::Int64)
            .field("C", Atom::Float64)
    }

    #[test]
    fn range_condition() {
        let cond = col("A").gt(0).and(col("A").le(1000));
        let vars = CondVars::new();
        assert!(cond.matches(&layout(), &Value::from((3, 4, 5.0)), &vars).unwrap());
        assert!(!cond.matches(&layout(), &Value::from((0, 4, 5.0)), &vars).unwrap());
        assert!(!cond.matches(&layout(), &Value::from((1001, 4, 5.0)), &vars).unwrap());
    }

    #[test]
    fn columns_variables_and_negation() {
        let row = Value::from((3, 4, 5.0));
        let mut vars = CondVars::new();
        vars.insert("limit".into(), Value::Int(4));

        assert!(col("A").lt(column("B")).matches(&layout(), &row, &vars).unwrap());
        assert!(col("B").eq(var("limit")).matches(&layout(), &row, &vars).unwrap());
        assert!(col("C").ge(5).matches(&layout(), &row, &vars).unwrap());
        assert!(col("A").eq(3).not().or(col("B").ne(4)).matches(&layout(), &row, &vars).is_ok_and(|hit| !hit));
    }

    #[test]
    fn errors_surface() {
        let row = Value::from((3, 4, 5.0));
        let vars = CondVars::new();
        assert!(matches!(
            col("Z").eq(1).matches(&layout(), &row, &vars),
            Err(StoreError::UnknownField(_))
        ));
        assert!(matches!(
            col("A").eq(var("missing")).matches(&layout(), &row, &vars),
            Err(StoreError::UnboundVariable(_))
        ));
        assert!(col("A").eq(true).matches(&layout(), &row, &vars).is_err());
    }

    #[test]
    fn nan_compares_false_except_ne() {
        let row = Value::from((3, 4, f64::NAN));
        let vars = CondVars::new();
        assert!(!col("C").gt(0).matches(&layout(), &row, &vars).unwrap());
        assert!(!col("C").le(0).matches(&layout(), &row, &vars).unwrap());
        assert!(!col("C").eq(column("C")).matches(&layout(), &row, &vars).unwrap());
        assert!(col("C").ne(1.5).matches(&layout(), &row, &vars).unwrap());
        assert!(!col("A").lt(f64::NAN).matches(&layout(), &row, &vars).unwrap());
        assert!(col("C").eq(false).matches(&layout(), &row, &vars).is_err());
    }
}
