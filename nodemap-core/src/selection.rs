use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::Value;

/// A `start:stop:step` row range with Python slice semantics.
///
/// Missing bounds cover the whole node; negative bounds count from the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl ReadRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        ReadRange { start, stop, step }
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn stop(mut self, stop: i64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Row positions this range covers in a node of `len` rows.
    pub fn positions(&self, len: usize) -> Result<Vec<usize>, StoreError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(StoreError::InvalidSelection("slice step cannot be zero".into()));
        }
        let len = len as i64;
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let adjust = |v: i64| (if v < 0 { v + len } else { v }).clamp(lower, upper);
        let start = self
            .start
            .map_or(if step > 0 { lower } else { upper }, adjust);
        let stop = self
            .stop
            .map_or(if step > 0 { upper } else { lower }, adjust);

        let mut out = Vec::new();
        let mut next = Some(start);
        while let Some(i) = next {
            if !((step > 0 && i < stop) || (step < 0 && i > stop)) {
                break;
            }
            out.push(i as usize);
            next = i.checked_add(step);
        }
        Ok(out)
    }
}

/// Indexed access key: a row, a range of rows, or a nested selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// A single row; negative indices count from the end.
    Index(i64),
    Slice(ReadRange),
    /// Explicit row positions, in the given order.
    Indices(Vec<i64>),
    /// Boolean mask; its length must equal the row count.
    Mask(Vec<bool>),
    /// The first part selects rows, the rest select inside each row.
    Tuple(Vec<Selection>),
}

impl Selection {
    pub fn slice(start: i64, stop: i64) -> Self {
        Selection::Slice(ReadRange::all().start(start).stop(stop))
    }
}

impl From<i64> for Selection {
    fn from(index: i64) -> Self {
        Selection::Index(index)
    }
}

impl From<i32> for Selection {
    fn from(index: i32) -> Self {
        Selection::Index(index.into())
    }
}

impl From<ReadRange> for Selection {
    fn from(range: ReadRange) -> Self {
        Selection::Slice(range)
    }
}

fn normalize(index: i64, len: usize) -> Result<usize, StoreError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(StoreError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

fn positions(len: usize, selection: &Selection) -> Result<Vec<usize>, StoreError> {
    match selection {
        Selection::Index(index) => Ok(vec![normalize(*index, len)?]),
        Selection::Slice(range) => range.positions(len),
        Selection::Indices(indices) => indices.iter().map(|i| normalize(*i, len)).collect(),
        Selection::Mask(mask) => {
            if mask.len() != len {
                return Err(StoreError::InvalidSelection(format!(
                    "mask of length {} for {len} rows",
                    mask.len()
                )));
            }
            Ok(mask
                .iter()
                .enumerate()
                .filter_map(|(i, keep)| keep.then_some(i))
                .collect())
        }
        Selection::Tuple(_) => Err(StoreError::InvalidSelection(
            "nested tuple selections are not supported".into(),
        )),
    }
}

/// Reads `selection` out of `rows`.
///
/// A single index yields the row itself; everything else yields an array.
pub fn select(rows: &[Value], selection: &Selection) -> Result<Value, StoreError> {
    match selection {
        Selection::Index(index) => Ok(rows[normalize(*index, rows.len())?].clone()),
        Selection::Tuple(parts) => {
            let (first, rest) = parts
                .split_first()
                .ok_or_else(|| StoreError::InvalidSelection("empty tuple selection".into()))?;
            let picked = select(rows, first)?;
            if rest.is_empty() {
                return Ok(picked);
            }
            let inner = Selection::Tuple(rest.to_vec());
            if let Selection::Index(_) = first {
                return select(inner_items(&picked)?, &inner);
            }
            let items = inner_items(&picked)?
                .iter()
                .map(|row| select(inner_items(row)?, &inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        other => Ok(Value::Array(
            positions(rows.len(), other)?
                .into_iter()
                .map(|i| rows[i].clone())
                .collect(),
        )),
    }
}

fn inner_items(value: &Value) -> Result<&[Value], StoreError> {
    value
        .items()
        .ok_or_else(|| StoreError::InvalidSelection("too many indices for a scalar".into()))
}

fn distribute(value: &Value, count: usize) -> Result<Vec<Value>, StoreError> {
    match value {
        Value::Array(items) if items.len() == count => Ok(items.clone()),
        Value::Array(items) if count != 1 => Err(StoreError::InvalidSelection(format!(
            "cannot assign {} values to {count} positions",
            items.len()
        ))),
        scalar_or_row => Ok(vec![scalar_or_row.clone(); count]),
    }
}

/// Writes `value` into `rows` at `selection`.
///
/// Every written row passes through `coerce`, which validates it against the
/// node layout. Multi-row selections take an array of matching length or a
/// single value that is broadcast.
pub fn assign(
    rows: &mut [Value],
    selection: &Selection,
    value: &Value,
    coerce: &dyn Fn(&Value) -> Result<Value, StoreError>,
) -> Result<(), StoreError> {
    match selection {
        Selection::Index(index) => {
            let idx = normalize(*index, rows.len())?;
            rows[idx] = coerce(value)?;
            Ok(())
        }
        Selection::Tuple(parts) => {
            let (first, rest) = parts
                .split_first()
                .ok_or_else(|| StoreError::InvalidSelection("empty tuple selection".into()))?;
            if rest.is_empty() {
                return assign(rows, first, value, coerce);
            }
            let inner = Selection::Tuple(rest.to_vec());
            let targets = positions(rows.len(), first)?;
            let values = match first {
                Selection::Index(_) => vec![value.clone()],
                _ => distribute(value, targets.len())?,
            };
            for (pos, value) in targets.into_iter().zip(values) {
                let mut row = rows[pos].clone();
                let items = match &mut row {
                    Value::Tuple(items) | Value::Array(items) => items,
                    _ => {
                        return Err(StoreError::InvalidSelection(
                            "too many indices for a scalar".into(),
                        ));
                    }
                };
                assign(items, &inner, &value, &|v: &Value| Ok(v.clone()))?;
                rows[pos] = coerce(&row)?;
            }
            Ok(())
        }
        other => {
            let targets = positions(rows.len(), other)?;
            let values = distribute(value, targets.len())?;
            for (pos, value) in targets.into_iter().zip(values) {
                rows[pos] = coerce(&value)?;
            }
            Ok(())
        }
    }
}
