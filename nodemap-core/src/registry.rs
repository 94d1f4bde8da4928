use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::binding::Binding;
use crate::error::{MappingError, Result};
use crate::params::NodeKind;
use crate::path::NodePath;
use crate::store::Store;
use crate::value::Value;

/// Anything that exposes a [`Binding`]: the typed handles and `Binding`
/// itself.
pub trait Mapping {
    fn binding(&self) -> &Binding;

    fn binding_mut(&mut self) -> &mut Binding;
}

impl Mapping for Binding {
    fn binding(&self) -> &Binding {
        self
    }

    fn binding_mut(&mut self) -> &mut Binding {
        self
    }
}

/// A user type whose fields are mapped onto store nodes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nodemap_core::{Atom, Container, Descriptor, EArray, Mapping, NodeKind};
///
/// struct Samples {
///     raw: EArray,
/// }
///
/// impl Container for Samples {
///     fn mappings(&mut self) -> Vec<&mut dyn Mapping> {
///         vec![&mut self.raw]
///     }
/// }
///
/// let raw = Descriptor::builder(NodeKind::EArray, "raw")
///     .atom(Atom::Float64)
///     .shape(&[0])
///     .build()
///     .unwrap();
/// let samples = Samples { raw: EArray::new(Arc::new(raw)).unwrap() };
/// ```
pub trait Container {
    /// Every mapped handle, in a fixed order.
    fn mappings(&mut self) -> Vec<&mut dyn Mapping>;

    /// Version tag recorded in the store's `STORE_VERSION` attribute.
    fn store_version(&self) -> Option<Value> {
        None
    }
}

/// One registered handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub name: String,
    pub path: NodePath,
    pub kind: NodeKind,
}

/// Cached view of a container's handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Enumerates the container's handles, rejecting two that target the
    /// same node.
    pub fn scan<C: Container + ?Sized>(container: &mut C) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for mapping in container.mappings() {
            let binding = mapping.binding();
            if !seen.insert(binding.path().clone()) {
                return Err(MappingError::configuration(format!(
                    "mapping {} targets {}, which is already mapped",
                    binding.name(),
                    binding.path()
                )));
            }
            entries.push(RegistryEntry {
                name: binding.name().to_string(),
                path: binding.path().clone(),
                kind: binding.kind(),
            });
        }
        Ok(Registry { entries })
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binds every handle to `store`; in write mode each is also created.
    ///
    /// Stops at the first failure. Handles visited before it stay resolved,
    /// later ones are bound but left unresolved. Returns how many handles
    /// were bound.
    #[instrument(skip_all, fields(location = %store.location().display(), write_mode = write_mode))]
    pub fn rebind<C: Container + ?Sized>(
        &self,
        container: &mut C,
        store: &Arc<dyn Store>,
        write_mode: bool,
    ) -> Result<usize> {
        let mut mappings = container.mappings();
        for mapping in mappings.iter_mut() {
            mapping.binding_mut().bind(store);
        }
        if write_mode {
            for mapping in mappings.iter_mut() {
                mapping.binding_mut().ensure_created()?;
            }
        }
        debug!(count = mappings.len(), "Rebound mappings");
        Ok(mappings.len())
    }

    /// Detaches every handle from its store.
    pub fn detach_all<C: Container + ?Sized>(&self, container: &mut C) {
        for mapping in container.mappings() {
            mapping.binding_mut().detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::descriptor::Descriptor;
    use crate::kinds::{EArray, Table};
    use crate::memory::MemoryBackend;
    use crate::store::{Backend, OpenMode};
    use crate::value::{Atom, Description};

    struct Pair {
        first: EArray,
        table: Table,
        last: EArray,
    }

    impl Container for Pair {
        fn mappings(&mut self) -> Vec<&mut dyn Mapping> {
            vec![&mut self.first, &mut self.table, &mut self.last]
        }
    }

    fn earray(name: &str) -> EArray {
        let desc = Descriptor::builder(NodeKind::EArray, name)
            .atom(Atom::Int32)
            .shape(&[0])
            .build()
            .unwrap();
        EArray::new(Arc::new(desc)).unwrap()
    }

    fn table(description: Description) -> Table {
        let desc = Descriptor::builder(NodeKind::Table, "table")
            .description(description)
            .build()
            .unwrap();
        Table::new(Arc::new(desc)).unwrap()
    }

    fn pair(description: Description) -> Pair {
        Pair {
            first: earray("first"),
            table: table(description),
            last: earray("last"),
        }
    }

    #[test]
    fn scan_lists_each_handle_once() {
        let mut pair = pair(Description::new().field("A", Atom::Int64));
        let registry = Registry::scan(&mut pair).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["first", "table", "last"]);
        assert_eq!(registry.entries()[1].kind, NodeKind::Table);
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let mut pair = pair(Description::new().field("A", Atom::Int64));
        pair.last = earray("first");
        assert!(matches!(
            Registry::scan(&mut pair),
            Err(MappingError::Configuration(_))
        ));
    }

    #[test]
    fn rebind_without_write_mode_does_no_io() {
        let mut pair = pair(Description::new().field("A", Atom::Int64));
        let registry = Registry::scan(&mut pair).unwrap();
        let store = MemoryBackend::new()
            .open(Path::new("registry"), OpenMode::Create)
            .unwrap();

        assert_eq!(registry.rebind(&mut pair, &store, false).unwrap(), 3);
        assert!(pair.first.is_attached());
        assert!(!pair.first.is_resolved());
        assert!(!store.contains(pair.first.path()).unwrap());
    }

    #[test]
    fn failed_rebind_keeps_earlier_handles() {
        // An empty description cannot be created, so the table fails.
        let mut pair = pair(Description::new());
        let registry = Registry::scan(&mut pair).unwrap();
        let store = MemoryBackend::new()
            .open(Path::new("registry"), OpenMode::Create)
            .unwrap();

        assert!(registry.rebind(&mut pair, &store, true).is_err());
        assert!(pair.first.is_resolved());
        assert!(!pair.table.is_resolved());
        assert!(pair.last.is_attached());
        assert!(!pair.last.is_resolved());

        registry.detach_all(&mut pair);
        assert!(!pair.first.is_attached());
    }
}
