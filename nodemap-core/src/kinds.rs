use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::binding::Binding;
use crate::condition::{CondVars, Condition};
use crate::descriptor::Descriptor;
use crate::error::{MappingError, Result};
use crate::params::NodeKind;
use crate::registry::Mapping;
use crate::selection::ReadRange;
use crate::value::Value;

fn expect_kind(descriptor: &Descriptor, kind: NodeKind) -> Result<()> {
    if descriptor.kind() == kind {
        Ok(())
    } else {
        Err(MappingError::configuration(format!(
            "mapping {} is declared as {} but used as {kind}",
            descriptor.name(),
            descriptor.kind()
        )))
    }
}

macro_rules! node_handle {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name(Binding);

        impl $name {
            /// Wraps `descriptor`, which must declare the matching kind.
            pub fn new(descriptor: Arc<Descriptor>) -> Result<Self> {
                expect_kind(&descriptor, $kind)?;
                Ok($name(Binding::new(descriptor)))
            }
        }

        impl Deref for $name {
            type Target = Binding;

            fn deref(&self) -> &Binding {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Binding {
                &mut self.0
            }
        }

        impl Mapping for $name {
            fn binding(&self) -> &Binding {
                &self.0
            }

            fn binding_mut(&mut self) -> &mut Binding {
                &mut self.0
            }
        }
    };
}

node_handle!(
    /// Handle on a record table.
    Table => NodeKind::Table
);
node_handle!(
    /// Handle on a fixed-size array.
    Array => NodeKind::Array
);
node_handle!(
    /// Handle on a chunked, compressible fixed-size array.
    CArray => NodeKind::CArray
);
node_handle!(
    /// Handle on an array extendable along its first dimension.
    EArray => NodeKind::EArray
);
node_handle!(
    /// Handle on an array of variable-length rows.
    VLArray => NodeKind::VLArray
);

fn collect_rows<T: Into<Value>>(rows: impl IntoIterator<Item = T>) -> Vec<Value> {
    rows.into_iter().map(Into::into).collect()
}

impl Table {
    /// Appends records, creating the table first if needed.
    pub fn append<T: Into<Value>>(&mut self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        self.0.append_rows(&collect_rows(rows))
    }

    /// Records matching `condition` within `range`.
    pub fn read_where(
        &mut self,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
    ) -> Result<Vec<Value>> {
        self.0.read_where(condition, vars, field, range)
    }

    /// Like [`read_where`](Self::read_where), but answers `default` when
    /// the table does not exist.
    pub fn read_where_or(
        &mut self,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
        default: Vec<Value>,
    ) -> Result<Vec<Value>> {
        match self.read_where(condition, vars, field, range) {
            Err(err) if err.is_not_found() => Ok(default),
            other => other,
        }
    }
}

impl EArray {
    /// Appends rows along the extendable dimension.
    pub fn append<T: Into<Value>>(&mut self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        self.0.append_rows(&collect_rows(rows))
    }
}

impl VLArray {
    /// Appends `row` as a single variable-length row.
    pub fn append(&mut self, row: impl Into<Value>) -> Result<()> {
        self.0.append_rows(&[row.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::condition::col;
    use crate::error::StoreError;
    use crate::memory::MemoryBackend;
    use crate::selection::Selection;
    use crate::store::{Backend, OpenMode, Store};
    use crate::value::{Atom, Description};

    fn store() -> Arc<dyn Store> {
        MemoryBackend::new()
            .open(Path::new("kinds"), OpenMode::Create)
            .unwrap()
    }

    fn descriptor(kind: NodeKind) -> Arc<Descriptor> {
        let builder = Descriptor::builder(kind, "node").atom(Atom::Int32);
        let builder = match kind {
            NodeKind::Table => builder.description(Description::new().field("A", Atom::Int64)),
            NodeKind::EArray => builder.shape(&[0]),
            NodeKind::Array | NodeKind::CArray => builder.shape(&[4]),
            _ => builder,
        };
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn kind_must_match() {
        assert!(Table::new(descriptor(NodeKind::Table)).is_ok());
        assert!(matches!(
            EArray::new(descriptor(NodeKind::Table)),
            Err(MappingError::Configuration(_))
        ));
    }

    #[test]
    fn table_append_and_filter() {
        let store = store();
        let mut table = Table::new(descriptor(NodeKind::Table)).unwrap();
        table.bind(&store);
        assert!(!table.is_resolved());

        table.append([1i64, 5, 9].map(|a| Value::tuple([a]))).unwrap();
        assert!(table.is_resolved());
        assert_eq!(table.row_count().unwrap(), 3);

        let hits = table
            .read_where(&col("A").ge(5), &CondVars::new(), Some("A"), &ReadRange::all())
            .unwrap();
        assert_eq!(hits, vec![Value::Int(5), Value::Int(9)]);
    }

    #[test]
    fn read_where_or_defaults_only_for_missing_tables() {
        let store = store();
        let mut table = Table::new(descriptor(NodeKind::Table)).unwrap();
        table.bind(&store);
        let fallback = vec![Value::Int(-1)];
        assert_eq!(
            table
                .read_where_or(&col("A").gt(0), &CondVars::new(), None, &ReadRange::all(), fallback.clone())
                .unwrap(),
            fallback
        );

        table.ensure_created().unwrap();
        assert!(matches!(
            table.read_where_or(&col("Z").gt(0), &CondVars::new(), None, &ReadRange::all(), fallback),
            Err(MappingError::Store(StoreError::UnknownField(_)))
        ));
    }

    #[test]
    fn vlarray_append_is_one_row() {
        let store = store();
        let mut vlarray = VLArray::new(descriptor(NodeKind::VLArray)).unwrap();
        vlarray.attach(&store).unwrap();
        vlarray.append(vec![1, 2, 3, 4]).unwrap();
        vlarray.append(vec![5]).unwrap();
        assert_eq!(vlarray.row_count().unwrap(), 2);
        assert_eq!(vlarray.get(1).unwrap(), Value::array([5]));
    }

    #[test]
    fn earray_append_extends_rows() {
        let store = store();
        let mut earray = EArray::new(descriptor(NodeKind::EArray)).unwrap();
        earray.attach(&store).unwrap();
        earray.append([1, 2, 3]).unwrap();
        assert_eq!(earray.row_count().unwrap(), 3);
        assert_eq!(
            earray.read(&ReadRange::all().step(2), None).unwrap(),
            vec![Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn fixed_arrays_are_filled_on_create() {
        let store = store();
        let mut carray = CArray::new(descriptor(NodeKind::CArray)).unwrap();
        carray.attach(&store).unwrap();
        assert_eq!(carray.row_count().unwrap(), 4);
        carray.set(Selection::slice(0, 2), 7).unwrap();
        assert_eq!(carray.get(Selection::slice(0, 3)).unwrap(), Value::array([7, 7, 0]));
    }
}
