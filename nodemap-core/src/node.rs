//! Node contents and the row-level operations every backend shares.
//!
//! Backends persist [`NodeEntry`] values however they like; the semantics of
//! reading, appending and indexed access live here so that they agree.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::condition::{CondVars, Condition};
use crate::error::StoreError;
use crate::params::{Filters, NodeKind, NodeParams};
use crate::path::NodePath;
use crate::selection::{self, ReadRange, Selection};
use crate::value::{Atom, ByteOrder, Description, Value};

/// Metadata a store keeps for every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Stamp allocated at creation; see [`NodeRef`](crate::NodeRef).
    pub generation: u64,
    pub title: String,
    pub atom: Option<Atom>,
    pub shape: Option<Vec<usize>>,
    pub description: Option<Description>,
    pub filters: Option<Filters>,
    pub chunkshape: Option<Vec<usize>>,
    pub byteorder: Option<ByteOrder>,
    pub expected_rows: Option<u64>,
    /// Unix seconds, recorded only when the node tracks times.
    pub created_at: Option<u64>,
    pub modified_at: Option<u64>,
}

/// A node as a backend stores it: metadata plus rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub info: NodeInfo,
    pub rows: Vec<Value>,
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

fn invalid(path: &NodePath, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidParams {
        path: path.clone(),
        reason: reason.into(),
    }
}

/// Derives `[rows, inner...]` from the first row of an initial object.
fn infer_shape(rows: &[Value]) -> Vec<usize> {
    let mut shape = vec![rows.len()];
    let mut probe = rows.first();
    while let Some(Value::Array(items)) = probe {
        shape.push(items.len());
        probe = items.first();
    }
    shape
}

fn first_scalar(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) | Value::Tuple(items) => items.iter().find_map(first_scalar),
        scalar if scalar.is_scalar() => Some(scalar),
        _ => None,
    }
}

fn coerce_shaped(atom: Atom, dims: &[usize], value: &Value) -> Result<Value, StoreError> {
    let Some((len, rest)) = dims.split_first() else {
        return atom.coerce(value);
    };
    match value {
        Value::Array(items) if items.len() == *len => Ok(Value::Array(
            items
                .iter()
                .map(|item| coerce_shaped(atom, rest, item))
                .collect::<Result<_, _>>()?,
        )),
        _ => Err(StoreError::TypeMismatch {
            expected: format!("array of {len} {atom:?}"),
            found: value.clone(),
        }),
    }
}

fn fill(atom: Atom, dims: &[usize]) -> Value {
    match dims.split_first() {
        None => atom.default_value(),
        Some((len, rest)) => Value::Array(vec![fill(atom, rest); *len]),
    }
}

impl NodeEntry {
    pub fn group(generation: u64) -> Self {
        NodeEntry {
            info: NodeInfo {
                kind: NodeKind::Group,
                generation,
                title: String::new(),
                atom: None,
                shape: None,
                description: None,
                filters: None,
                chunkshape: None,
                byteorder: None,
                expected_rows: None,
                created_at: None,
                modified_at: None,
            },
            rows: Vec::new(),
        }
    }

    /// Builds a new node from forwarded creation parameters.
    pub fn create(path: &NodePath, params: &NodeParams, generation: u64) -> Result<Self, StoreError> {
        let now = if params.track_times { unix_now() } else { None };
        let initial = match &params.obj {
            None => Vec::new(),
            Some(Value::Array(rows)) => rows.clone(),
            Some(other) => {
                return Err(invalid(
                    path,
                    format!("initial object must be an array of rows, got {other:?}"),
                ));
            }
        };
        let inferred_atom = || initial.iter().find_map(first_scalar).and_then(Atom::infer);

        let mut info = NodeInfo {
            kind: params.kind,
            generation,
            title: params.title.clone(),
            atom: params.atom,
            shape: params.shape.clone(),
            description: params.description.clone(),
            filters: params.filters.clone(),
            chunkshape: params.chunkshape.clone(),
            byteorder: params.byteorder,
            expected_rows: params.expected_rows,
            created_at: now,
            modified_at: now,
        };

        let rows = match params.kind {
            NodeKind::Group => Vec::new(),
            NodeKind::Table => {
                if info.description.as_ref().is_none_or(Description::is_empty) {
                    return Err(invalid(path, "a table needs a non-empty description"));
                }
                initial
            }
            NodeKind::Array | NodeKind::CArray if params.obj.is_some() => {
                info.atom = info.atom.or_else(inferred_atom);
                info.shape = Some(infer_shape(&initial));
                initial
            }
            NodeKind::Array | NodeKind::CArray => {
                let (Some(atom), Some(shape)) = (info.atom, info.shape.as_ref()) else {
                    return Err(invalid(
                        path,
                        format!("{} needs an atom and a shape, or an initial object", params.kind),
                    ));
                };
                match fill(atom, shape) {
                    Value::Array(rows) => rows,
                    _ => return Err(invalid(path, "shape must have at least one dimension")),
                }
            }
            NodeKind::EArray => {
                info.atom = info.atom.or_else(inferred_atom);
                if info.shape.is_none() && params.obj.is_some() {
                    let mut shape = infer_shape(&initial);
                    shape[0] = 0;
                    info.shape = Some(shape);
                }
                if info.atom.is_none() || info.shape.is_none() {
                    return Err(invalid(
                        path,
                        "EArray needs an atom and a shape, or an initial object",
                    ));
                }
                initial
            }
            NodeKind::VLArray => {
                info.atom = info.atom.or_else(inferred_atom);
                if info.atom.is_none() {
                    return Err(invalid(path, "VLArray needs an atom or an initial object"));
                }
                initial
            }
        };

        let mut entry = NodeEntry { info, rows: Vec::new() };
        entry.rows = rows
            .iter()
            .map(|row| entry.coerce_row(row))
            .collect::<Result<_, _>>()?;
        Ok(entry)
    }

    pub fn kind(&self) -> NodeKind {
        self.info.kind
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Validates one row against the node layout.
    pub fn coerce_row(&self, row: &Value) -> Result<Value, StoreError> {
        let unsupported = || StoreError::Unsupported {
            operation: "row data",
            kind: self.info.kind,
        };
        match self.info.kind {
            NodeKind::Group => Err(unsupported()),
            NodeKind::Table => self
                .info
                .description
                .as_ref()
                .ok_or_else(unsupported)?
                .coerce_row(row),
            NodeKind::Array | NodeKind::CArray | NodeKind::EArray => {
                let atom = self.info.atom.ok_or_else(unsupported)?;
                let dims = self.info.shape.as_deref().unwrap_or(&[]);
                coerce_shaped(atom, dims.get(1..).unwrap_or(&[]), row)
            }
            NodeKind::VLArray => {
                let atom = self.info.atom.ok_or_else(unsupported)?;
                match row {
                    Value::Array(items) => Ok(Value::Array(
                        items
                            .iter()
                            .map(|item| atom.coerce(item))
                            .collect::<Result<_, _>>()?,
                    )),
                    _ => Err(StoreError::TypeMismatch {
                        expected: format!("variable-length array of {atom:?}"),
                        found: row.clone(),
                    }),
                }
            }
        }
    }

    fn touch(&mut self) {
        if self.info.modified_at.is_some() {
            self.info.modified_at = unix_now();
        }
    }

    fn project(&self, rows: Vec<Value>, field: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let Some(field) = field else {
            return Ok(rows);
        };
        let description = self.info.description.as_ref().ok_or(StoreError::Unsupported {
            operation: "field selection",
            kind: self.info.kind,
        })?;
        let (idx, _) = description
            .column(field)
            .ok_or_else(|| StoreError::UnknownField(field.to_string()))?;
        rows.into_iter()
            .map(|row| {
                row.items()
                    .and_then(|items| items.get(idx).cloned())
                    .ok_or_else(|| StoreError::UnknownField(field.to_string()))
            })
            .collect()
    }

    pub fn read(&self, range: &ReadRange, field: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let rows = range
            .positions(self.rows.len())?
            .into_iter()
            .map(|i| self.rows[i].clone())
            .collect();
        self.project(rows, field)
    }

    pub fn read_where(
        &self,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
    ) -> Result<Vec<Value>, StoreError> {
        let description = match (&self.info.kind, &self.info.description) {
            (NodeKind::Table, Some(description)) => description,
            _ => {
                return Err(StoreError::Unsupported {
                    operation: "read_where",
                    kind: self.info.kind,
                });
            }
        };
        let mut hits = Vec::new();
        for i in range.positions(self.rows.len())? {
            let row = &self.rows[i];
            if condition.matches(description, row, vars)? {
                hits.push(row.clone());
            }
        }
        self.project(hits, field)
    }

    /// Appends rows; all are validated before any is added.
    pub fn append(&mut self, rows: &[Value]) -> Result<(), StoreError> {
        if !self.info.kind.is_appendable() {
            return Err(StoreError::Unsupported {
                operation: "append",
                kind: self.info.kind,
            });
        }
        let rows = rows
            .iter()
            .map(|row| self.coerce_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.rows.extend(rows);
        self.touch();
        Ok(())
    }

    pub fn get(&self, selection: &Selection) -> Result<Value, StoreError> {
        if self.info.kind == NodeKind::Group {
            return Err(StoreError::Unsupported {
                operation: "indexed read",
                kind: NodeKind::Group,
            });
        }
        selection::select(&self.rows, selection)
    }

    /// Indexed write. The row count never changes.
    pub fn set(&mut self, selection: &Selection, value: &Value) -> Result<(), StoreError> {
        let mut rows = self.rows.clone();
        selection::assign(&mut rows, selection, value, &|row: &Value| self.coerce_row(row))?;
        self.rows = rows;
        self.touch();
        Ok(())
    }
}
