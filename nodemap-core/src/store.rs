use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::condition::{CondVars, Condition};
use crate::error::StoreError;
use crate::node::{NodeEntry, NodeInfo};
use crate::params::{NodeKind, NodeParams};
use crate::path::NodePath;
use crate::selection::{ReadRange, Selection};
use crate::value::Value;

/// How a store file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    /// Read-write; an existing file is truncated.
    Create,
    /// Read-write; the file is created if missing.
    Append,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

impl FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::ReadOnly),
            "w" => Ok(OpenMode::Create),
            "a" | "r+" => Ok(OpenMode::Append),
            _ => Err(format!("unknown open mode: {}", s)),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::ReadOnly => write!(f, "r"),
            OpenMode::Create => write!(f, "w"),
            OpenMode::Append => write!(f, "a"),
        }
    }
}

/// A resolved reference to a node.
///
/// Only valid against the store that produced it, and only while the node
/// it points at is the one created with the same generation. A removed (or
/// removed and recreated) node makes the reference stale; stores answer
/// stale references with [`StoreError::NodeNotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    path: NodePath,
    kind: NodeKind,
    generation: u64,
}

impl NodeRef {
    pub fn new(path: NodePath, kind: NodeKind, generation: u64) -> Self {
        NodeRef {
            path,
            kind,
            generation,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// An open hierarchical store.
///
/// This is the narrow interface the mapping layer delegates to: encoding,
/// layout and durability are the implementation's business. All methods
/// take `&self`; implementations lock internally.
pub trait Store: Send + Sync {
    fn location(&self) -> &Path;

    fn mode(&self) -> OpenMode;

    fn is_writable(&self) -> bool {
        self.mode().is_writable()
    }

    fn is_open(&self) -> bool;

    fn close(&self) -> Result<(), StoreError>;

    fn flush(&self) -> Result<(), StoreError>;

    fn contains(&self, path: &NodePath) -> Result<bool, StoreError>;

    /// Looks a node up without creating it.
    fn lookup_node(&self, path: &NodePath) -> Result<NodeRef, StoreError>;

    /// Creates `parent/name`, creating missing parent groups when
    /// `params.create_parents` is set.
    fn create_node(
        &self,
        parent: &NodePath,
        name: &str,
        params: &NodeParams,
    ) -> Result<NodeRef, StoreError>;

    fn remove_node(&self, path: &NodePath, recursive: bool) -> Result<(), StoreError>;

    fn read(
        &self,
        node: &NodeRef,
        range: &ReadRange,
        field: Option<&str>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Rows of a table matching `condition`, restricted to `range`.
    fn read_where(
        &self,
        node: &NodeRef,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
    ) -> Result<Vec<Value>, StoreError>;

    fn append(&self, node: &NodeRef, rows: &[Value]) -> Result<(), StoreError>;

    fn flush_node(&self, node: &NodeRef) -> Result<(), StoreError>;

    fn row_count(&self, node: &NodeRef) -> Result<u64, StoreError>;

    fn get_item(&self, node: &NodeRef, selection: &Selection) -> Result<Value, StoreError>;

    fn set_item(
        &self,
        node: &NodeRef,
        selection: &Selection,
        value: &Value,
    ) -> Result<(), StoreError>;

    fn node_info(&self, node: &NodeRef) -> Result<NodeInfo, StoreError>;

    /// Reads a root attribute.
    fn get_attr(&self, name: &str) -> Result<Option<Value>, StoreError>;

    fn set_attr(&self, name: &str, value: Value) -> Result<(), StoreError>;
}

/// Opens and removes store files.
pub trait Backend: Send + Sync {
    fn open(&self, location: &Path, mode: OpenMode) -> Result<Arc<dyn Store>, StoreError>;

    fn remove(&self, location: &Path) -> Result<(), StoreError>;

    fn exists(&self, location: &Path) -> bool;
}

/// Flat key/value surface over which [`Store`] is implemented generically.
///
/// Implementors persist one [`NodeEntry`] per path plus root attributes;
/// the tree rules (parent groups, recursive removal, generations, mode
/// checks) come from the blanket `Store` impl. Methods are prefixed with
/// `table_` to avoid name collisions with `Store`.
pub trait EntryTable: Send + Sync {
    fn table_location(&self) -> &Path;

    fn table_mode(&self) -> OpenMode;

    fn table_is_open(&self) -> bool;

    fn table_close(&self) -> Result<(), StoreError>;

    fn table_flush(&self) -> Result<(), StoreError>;

    fn table_get(&self, path: &NodePath) -> Result<Option<NodeEntry>, StoreError>;

    fn table_put(&self, path: &NodePath, entry: &NodeEntry) -> Result<(), StoreError>;

    fn table_delete(&self, path: &NodePath) -> Result<(), StoreError>;

    /// Every stored path strictly below `path`.
    fn table_descendants(&self, path: &NodePath) -> Result<Vec<NodePath>, StoreError>;

    /// Allocates a fresh, never reused generation stamp.
    fn table_next_generation(&self) -> Result<u64, StoreError>;

    fn table_get_attr(&self, name: &str) -> Result<Option<Value>, StoreError>;

    fn table_put_attr(&self, name: &str, value: &Value) -> Result<(), StoreError>;
}

trait EntryTableExt: EntryTable {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.table_is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed(self.table_location().to_path_buf()))
        }
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.table_mode().is_writable() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly(self.table_location().to_path_buf()))
        }
    }

    /// Loads the entry a reference points at, rejecting stale references.
    fn load(&self, node: &NodeRef) -> Result<NodeEntry, StoreError> {
        self.ensure_open()?;
        match self.table_get(node.path())? {
            Some(entry) if entry.info.generation == node.generation() => Ok(entry),
            _ => Err(StoreError::NodeNotFound(node.path().clone())),
        }
    }
}

impl<T: EntryTable + ?Sized> EntryTableExt for T {}

/// Blanket impl: any `EntryTable` is also a `Store`.
impl<T: EntryTable> Store for T {
    fn location(&self) -> &Path {
        self.table_location()
    }

    fn mode(&self) -> OpenMode {
        self.table_mode()
    }

    fn is_open(&self) -> bool {
        self.table_is_open()
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.table_is_open() {
            self.table_close()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.table_mode().is_writable() {
            self.table_flush()?;
        }
        Ok(())
    }

    fn contains(&self, path: &NodePath) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(path.is_root() || self.table_get(path)?.is_some())
    }

    fn lookup_node(&self, path: &NodePath) -> Result<NodeRef, StoreError> {
        self.ensure_open()?;
        if path.is_root() {
            return Ok(NodeRef::new(NodePath::root(), NodeKind::Group, 0));
        }
        let entry = self
            .table_get(path)?
            .ok_or_else(|| StoreError::NodeNotFound(path.clone()))?;
        Ok(NodeRef::new(path.clone(), entry.kind(), entry.info.generation))
    }

    fn create_node(
        &self,
        parent: &NodePath,
        name: &str,
        params: &NodeParams,
    ) -> Result<NodeRef, StoreError> {
        self.ensure_writable()?;
        let path = parent.join(name).map_err(|err| StoreError::InvalidParams {
            path: parent.clone(),
            reason: err.to_string(),
        })?;
        if self.table_get(&path)?.is_some() {
            return Err(StoreError::NodeExists(path));
        }
        let entry = NodeEntry::create(&path, params, self.table_next_generation()?)?;

        for ancestor in path.ancestors().iter().filter(|p| !p.is_root()) {
            match self.table_get(ancestor)? {
                Some(existing) if existing.kind() == NodeKind::Group => {}
                Some(_) => return Err(StoreError::NotAGroup(ancestor.clone())),
                None if params.create_parents => {
                    let group = NodeEntry::group(self.table_next_generation()?);
                    self.table_put(ancestor, &group)?;
                }
                None => return Err(StoreError::NodeNotFound(ancestor.clone())),
            }
        }

        self.table_put(&path, &entry)?;
        Ok(NodeRef::new(path, entry.kind(), entry.info.generation))
    }

    fn remove_node(&self, path: &NodePath, recursive: bool) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if path.is_root() {
            return Err(StoreError::Unsupported {
                operation: "removing the root",
                kind: NodeKind::Group,
            });
        }
        if self.table_get(path)?.is_none() {
            return Err(StoreError::NodeNotFound(path.clone()));
        }
        let below = self.table_descendants(path)?;
        if !below.is_empty() && !recursive {
            return Err(StoreError::GroupNotEmpty(path.clone()));
        }
        for child in &below {
            self.table_delete(child)?;
        }
        self.table_delete(path)
    }

    fn read(
        &self,
        node: &NodeRef,
        range: &ReadRange,
        field: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        self.load(node)?.read(range, field)
    }

    fn read_where(
        &self,
        node: &NodeRef,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
    ) -> Result<Vec<Value>, StoreError> {
        self.load(node)?.read_where(condition, vars, field, range)
    }

    fn append(&self, node: &NodeRef, rows: &[Value]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let mut entry = self.load(node)?;
        entry.append(rows)?;
        self.table_put(node.path(), &entry)
    }

    fn flush_node(&self, node: &NodeRef) -> Result<(), StoreError> {
        self.load(node)?;
        Store::flush(self)
    }

    fn row_count(&self, node: &NodeRef) -> Result<u64, StoreError> {
        Ok(self.load(node)?.row_count())
    }

    fn get_item(&self, node: &NodeRef, selection: &Selection) -> Result<Value, StoreError> {
        self.load(node)?.get(selection)
    }

    fn set_item(
        &self,
        node: &NodeRef,
        selection: &Selection,
        value: &Value,
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let mut entry = self.load(node)?;
        entry.set(selection, value)?;
        self.table_put(node.path(), &entry)
    }

    fn node_info(&self, node: &NodeRef) -> Result<NodeInfo, StoreError> {
        Ok(self.load(node)?.info)
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_open()?;
        self.table_get_attr(name)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.table_put_attr(name, &value)
    }
}
