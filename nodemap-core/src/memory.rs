use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::node::NodeEntry;
use crate::path::NodePath;
use crate::store::{Backend, EntryTable, OpenMode, Store};
use crate::value::Value;

#[derive(Debug, Default)]
struct MemoryFile {
    entries: BTreeMap<NodePath, NodeEntry>,
    attrs: IndexMap<String, Value>,
    generation: u64,
}

type SharedFile = Arc<RwLock<MemoryFile>>;

/// A backend whose "files" live in a process-local map.
///
/// Files survive `close` and can be reopened until removed, which makes
/// this backend suitable for tests and as a reference implementation.
/// Clones share the same files.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    files: Arc<RwLock<HashMap<PathBuf, SharedFile>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn open(&self, location: &Path, mode: OpenMode) -> Result<Arc<dyn Store>, StoreError> {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let file = match mode {
            OpenMode::ReadOnly => files
                .get(location)
                .cloned()
                .ok_or_else(|| StoreError::NoSuchFile(location.to_path_buf()))?,
            OpenMode::Create => {
                let file = SharedFile::default();
                files.insert(location.to_path_buf(), Arc::clone(&file));
                file
            }
            OpenMode::Append => Arc::clone(files.entry(location.to_path_buf()).or_default()),
        };
        Ok(Arc::new(MemoryStore {
            location: location.to_path_buf(),
            mode,
            file,
            open: AtomicBool::new(true),
        }))
    }

    fn remove(&self, location: &Path) -> Result<(), StoreError> {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files
            .remove(location)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchFile(location.to_path_buf()))
    }

    fn exists(&self, location: &Path) -> bool {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.contains_key(location)
    }
}

/// An open handle on one in-memory file.
#[derive(Debug)]
pub struct MemoryStore {
    location: PathBuf,
    mode: OpenMode,
    file: SharedFile,
    open: AtomicBool,
}

impl MemoryStore {
    fn with_file<R>(&self, f: impl FnOnce(&MemoryFile) -> R) -> R {
        let file = self.file.read().unwrap_or_else(PoisonError::into_inner);
        f(&*file)
    }

    fn with_file_mut<R>(&self, f: impl FnOnce(&mut MemoryFile) -> R) -> R {
        let mut file = self.file.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *file)
    }
}

impl EntryTable for MemoryStore {
    fn table_location(&self) -> &Path {
        &self.location
    }

    fn table_mode(&self) -> OpenMode {
        self.mode
    }

    fn table_is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn table_close(&self) -> Result<(), StoreError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn table_flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn table_get(&self, path: &NodePath) -> Result<Option<NodeEntry>, StoreError> {
        Ok(self.with_file(|file| file.entries.get(path).cloned()))
    }

    fn table_put(&self, path: &NodePath, entry: &NodeEntry) -> Result<(), StoreError> {
        self.with_file_mut(|file| file.entries.insert(path.clone(), entry.clone()));
        Ok(())
    }

    fn table_delete(&self, path: &NodePath) -> Result<(), StoreError> {
        self.with_file_mut(|file| file.entries.remove(path));
        Ok(())
    }

    fn table_descendants(&self, path: &NodePath) -> Result<Vec<NodePath>, StoreError> {
        Ok(self.with_file(|file| {
            file.entries
                .range(path.clone()..)
                .map(|(p, _)| p)
                .filter(|p| path.is_ancestor_of(p))
                .cloned()
                .collect()
        }))
    }

    fn table_next_generation(&self) -> Result<u64, StoreError> {
        Ok(self.with_file_mut(|file| {
            file.generation += 1;
            file.generation
        }))
    }

    fn table_get_attr(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.with_file(|file| file.attrs.get(name).cloned()))
    }

    fn table_put_attr(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        self.with_file_mut(|file| file.attrs.insert(name.to_string(), value.clone()));
        Ok(())
    }
}
