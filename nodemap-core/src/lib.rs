//! Declarative mapping of container fields onto nodes of a hierarchical store.
//!
//! Core concepts:
//! - **Descriptor**: an immutable template naming a node (path, kind,
//!   creation parameters, overwrite flag), shared by every container instance
//! - **Binding**: a descriptor bound to one store; resolves or creates its
//!   node lazily, on first use
//! - **Table / Array / CArray / EArray / VLArray**: typed handles over a
//!   binding
//! - **Container**: a user type listing its handles; the **Registry** binds
//!   them all when a store is opened
//! - **MappedFile**: owns the open store and the container
//! - **Store / Backend**: the storage collaborator. [`MemoryBackend`] ships
//!   here; `nodemap-rocks` provides a persistent one
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nodemap_core::{
//!     col, Atom, CondVars, Container, Description, Descriptor, EArray, MappedFile, Mapping,
//!     MemoryBackend, NodeKind, OpenMode, ReadRange, Table, Value,
//! };
//!
//! struct Run {
//!     hits: Table,
//!     trace: EArray,
//! }
//!
//! impl Container for Run {
//!     fn mappings(&mut self) -> Vec<&mut dyn Mapping> {
//!         vec![&mut self.hits, &mut self.trace]
//!     }
//! }
//!
//! let hits = Descriptor::builder(NodeKind::Table, "hits")
//!     .parent("/run")
//!     .description(Description::new().field("x", Atom::Int64).field("y", Atom::Int64))
//!     .build()
//!     .unwrap();
//! let trace = Descriptor::builder(NodeKind::EArray, "trace")
//!     .parent("/run")
//!     .atom(Atom::Float64)
//!     .shape(&[0])
//!     .build()
//!     .unwrap();
//! let run = Run {
//!     hits: Table::new(Arc::new(hits)).unwrap(),
//!     trace: EArray::new(Arc::new(trace)).unwrap(),
//! };
//!
//! let mut file = MappedFile::open(Arc::new(MemoryBackend::new()), "run", OpenMode::Create, run).unwrap();
//! file.hits.append([(1i64, 2i64), (3, 4)]).unwrap();
//! file.trace.append([0.5, 1.5]).unwrap();
//!
//! let far = file
//!     .hits
//!     .read_where(&col("x").gt(2), &CondVars::new(), Some("y"), &ReadRange::all())
//!     .unwrap();
//! assert_eq!(far, vec![Value::Int(4)]);
//! ```

mod binding;
mod condition;
mod config;
mod descriptor;
mod error;
mod file;
mod kinds;
mod memory;
mod node;
mod params;
mod path;
mod registry;
mod selection;
mod store;
mod value;

pub use binding::Binding;
pub use condition::{col, column, var, CmpOp, Column, CondVars, Condition, Operand};
pub use config::{
    default_data_filter, default_index_filter, Defaults, KindDefaults, DEFAULT_CHUNKSHAPE,
    DEFAULT_COLUMNS_CHUNKSHAPE, DEFAULT_DATA_COMPLEVEL, DEFAULT_DATA_COMPLIB,
    DEFAULT_EARRAY_EXPECTED_ROWS, DEFAULT_EXPECTED_ROWS,
    DEFAULT_INDEX_COMPLEVEL, DEFAULT_INDEX_COMPLIB,
};
pub use descriptor::{Descriptor, DescriptorBuilder};
pub use error::{MappingError, Result, StoreError};
pub use file::{MappedFile, STORE_VERSION};
pub use kinds::{Array, CArray, EArray, Table, VLArray};
pub use memory::{MemoryBackend, MemoryStore};
pub use node::{NodeEntry, NodeInfo};
pub use params::{CreateParams, Filters, NodeKind, NodeParams, Param};
pub use path::NodePath;
pub use registry::{Container, Mapping, Registry, RegistryEntry};
pub use selection::{assign, select, ReadRange, Selection};
pub use store::{Backend, EntryTable, NodeRef, OpenMode, Store};
pub use value::{Atom, ByteOrder, Description, Value};
