//! Per-instance node handles.
//!
//! A [`Binding`] pairs a shared [`Descriptor`] with the store it is attached
//! to and tracks whether the target node has been looked up or created yet.
//! No store I/O happens until an operation needs the node.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, instrument};

use crate::condition::{CondVars, Condition};
use crate::descriptor::Descriptor;
use crate::error::{MappingError, Result, StoreError};
use crate::node::NodeInfo;
use crate::params::NodeKind;
use crate::path::NodePath;
use crate::selection::{ReadRange, Selection};
use crate::store::{NodeRef, Store};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Unresolved,
    Resolved(NodeRef),
}

/// A descriptor bound to one container instance.
///
/// The store is held weakly: the owning [`MappedFile`](crate::MappedFile)
/// keeps it alive, and a handle that outlives it reports
/// [`MappingError::StoreNotAttached`].
pub struct Binding {
    descriptor: Arc<Descriptor>,
    store: Option<Weak<dyn Store>>,
    state: NodeState,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.descriptor.name())
            .field("path", self.descriptor.path())
            .field("attached", &self.is_attached())
            .field("state", &self.state)
            .finish()
    }
}

impl Binding {
    /// Creates an unbound, unresolved binding for `descriptor`.
    pub fn new(descriptor: Arc<Descriptor>) -> Self {
        Binding {
            descriptor,
            store: None,
            state: NodeState::Unresolved,
        }
    }

    /// The shared template this binding was created from.
    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// Logical name of the mapping.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Full path of the target node.
    pub fn path(&self) -> &NodePath {
        self.descriptor.path()
    }

    /// Node kind the descriptor declares.
    pub fn kind(&self) -> NodeKind {
        self.descriptor.kind()
    }

    /// Returns true if a node reference is cached.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, NodeState::Resolved(_))
    }

    /// Returns true while the bound store is still alive.
    pub fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Binds to `store` without touching it. Any cached node is dropped.
    pub fn bind(&mut self, store: &Arc<dyn Store>) {
        self.store = Some(Arc::downgrade(store));
        self.state = NodeState::Unresolved;
    }

    /// Binds to `store` and, if it is writable, materializes the node.
    pub fn attach(&mut self, store: &Arc<dyn Store>) -> Result<()> {
        self.bind(store);
        if store.is_writable() {
            self.ensure_created()?;
        }
        Ok(())
    }

    /// Forgets the store and any cached node.
    pub fn detach(&mut self) {
        self.store = None;
        self.state = NodeState::Unresolved;
    }

    fn upgrade(&self) -> Option<Arc<dyn Store>> {
        self.store.as_ref().and_then(Weak::upgrade)
    }

    fn store(&self) -> Result<Arc<dyn Store>> {
        self.upgrade()
            .ok_or_else(|| MappingError::StoreNotAttached(self.path().clone()))
    }

    fn check_kind(&self, node: &NodeRef) -> Result<()> {
        if node.kind() == self.kind() {
            Ok(())
        } else {
            Err(MappingError::configuration(format!(
                "{} holds a {} node but mapping {} expects a {}",
                node.path(),
                node.kind(),
                self.name(),
                self.kind()
            )))
        }
    }

    /// Makes sure the target node exists and caches a reference to it.
    ///
    /// An existing node is removed and recreated when the descriptor asks
    /// for overwrite, and adopted otherwise.
    #[instrument(skip(self), fields(path = %self.descriptor.path()))]
    pub fn ensure_created(&mut self) -> Result<NodeRef> {
        if let NodeState::Resolved(node) = &self.state {
            return Ok(node.clone());
        }
        let store = self.store()?;
        let path = self.descriptor.path();

        let node = if store.contains(path)? {
            if self.descriptor.overwrite() {
                debug!("Removing existing node before recreating it");
                store.remove_node(path, true)?;
                self.create(store.as_ref())?
            } else {
                debug!("Adopting existing node");
                let node = store.lookup_node(path)?;
                self.check_kind(&node)?;
                node
            }
        } else {
            self.create(store.as_ref())?
        };

        self.state = NodeState::Resolved(node.clone());
        Ok(node)
    }

    fn create(&self, store: &dyn Store) -> Result<NodeRef> {
        debug!(kind = %self.kind(), "Creating node");
        Ok(store.create_node(
            self.descriptor.parent(),
            self.descriptor.leaf(),
            self.descriptor.params(),
        )?)
    }

    /// Returns the cached reference or looks the node up. Never creates.
    pub fn resolve(&mut self) -> Result<NodeRef> {
        if let NodeState::Resolved(node) = &self.state {
            return Ok(node.clone());
        }
        let node = self.store()?.lookup_node(self.path())?;
        self.check_kind(&node)?;
        self.state = NodeState::Resolved(node.clone());
        Ok(node)
    }

    /// Runs `op` against the resolved node. A reference the store no
    /// longer recognizes is dropped from the cache before the error is
    /// returned.
    fn with_node<T>(
        &mut self,
        create: bool,
        op: impl FnOnce(&dyn Store, &NodeRef) -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let node = if create {
            self.ensure_created()?
        } else {
            self.resolve()?
        };
        let store = self.store()?;
        op(store.as_ref(), &node).map_err(|err| {
            if matches!(err, StoreError::NodeNotFound(_)) {
                self.state = NodeState::Unresolved;
            }
            err.into()
        })
    }

    /// Removes the target node from the store.
    #[instrument(skip(self), fields(path = %self.descriptor.path()))]
    pub fn remove(&mut self) -> Result<()> {
        let store = self.store()?;
        self.state = NodeState::Unresolved;
        debug!("Removing node");
        Ok(store.remove_node(self.path(), true)?)
    }

    /// Number of rows in the node.
    ///
    /// Unlike every other accessor this never fails for a missing node:
    /// without a store, without a node at the target path, or with a stale
    /// cached reference it answers 0.
    pub fn row_count(&mut self) -> Result<u64> {
        let Some(store) = self.upgrade() else {
            return Ok(0);
        };
        if let NodeState::Resolved(node) = self.state.clone() {
            return match store.row_count(&node) {
                Err(StoreError::NodeNotFound(_)) => {
                    self.state = NodeState::Unresolved;
                    Ok(0)
                }
                other => Ok(other?),
            };
        }
        match store.lookup_node(self.path()) {
            Ok(node) => {
                let rows = store.row_count(&node)?;
                self.state = NodeState::Resolved(node);
                Ok(rows)
            }
            Err(StoreError::NodeNotFound(_)) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Reads rows in `range`, optionally projecting a single table field.
    pub fn read(&mut self, range: &ReadRange, field: Option<&str>) -> Result<Vec<Value>> {
        self.with_node(false, |store, node| store.read(node, range, field))
    }

    /// Like [`read`](Self::read), but answers `default` when the node does
    /// not exist.
    pub fn read_or(
        &mut self,
        range: &ReadRange,
        field: Option<&str>,
        default: Vec<Value>,
    ) -> Result<Vec<Value>> {
        match self.read(range, field) {
            Err(err) if err.is_not_found() => Ok(default),
            other => other,
        }
    }

    /// Indexed read.
    pub fn get(&mut self, selection: impl Into<Selection>) -> Result<Value> {
        let selection = selection.into();
        self.with_node(false, |store, node| store.get_item(node, &selection))
    }

    /// Indexed write. Creates the node first if needed.
    pub fn set(&mut self, selection: impl Into<Selection>, value: impl Into<Value>) -> Result<()> {
        let selection = selection.into();
        let value = value.into();
        self.with_node(true, |store, node| store.set_item(node, &selection, &value))
    }

    /// Looks up the group holding the target node.
    pub fn parent_node(&self) -> Result<NodeRef> {
        Ok(self.store()?.lookup_node(self.descriptor.parent())?)
    }

    /// Metadata of the target node; fails if it does not exist.
    pub fn info(&mut self) -> Result<NodeInfo> {
        self.with_node(false, |store, node| store.node_info(node))
    }

    pub(crate) fn append_rows(&mut self, rows: &[Value]) -> Result<()> {
        self.with_node(true, |store, node| {
            store.append(node, rows)?;
            store.flush_node(node)
        })
    }

    pub(crate) fn read_where(
        &mut self,
        condition: &Condition,
        vars: &CondVars,
        field: Option<&str>,
        range: &ReadRange,
    ) -> Result<Vec<Value>> {
        self.with_node(false, |store, node| {
            store.read_where(node, condition, vars, field, range)
        })
    }
}
