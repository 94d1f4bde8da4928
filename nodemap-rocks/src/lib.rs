//! RocksDB-backed store for nodemap.
//!
//! Each store "file" is a RocksDB directory. Every node is one key holding
//! its CBOR-encoded [`NodeEntry`]; root attributes and the generation
//! counter live under their own key prefixes.
//!
//! Rows are not chunked: `append`, `set_item` and `get_item` decode and
//! re-encode the whole node entry, so the cost of each call grows with the
//! node's size and many small appends to a large node are quadratic overall.
//! Batch appends where possible.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use nodemap_core::{Backend, EntryTable, NodeEntry, NodePath, OpenMode, Store, StoreError, Value};
use rocksdb::{DB, Direction, IteratorMode, Options};
use thiserror::Error;
use tracing::debug;

const NODE_PREFIX: &str = "n:";
const ATTR_PREFIX: &str = "a:";
const GENERATION_KEY: &[u8] = b"m:generation";

#[derive(Debug, Error)]
pub enum RocksError {
    #[error("RocksDB error: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
    #[error("corrupt key {0:?}")]
    CorruptKey(String),
}

impl From<RocksError> for StoreError {
    fn from(err: RocksError) -> Self {
        match err {
            RocksError::Db(err) => StoreError::Backend(Box::new(err)),
            other => StoreError::Codec(other.to_string()),
        }
    }
}

fn node_key(path: &NodePath) -> Vec<u8> {
    format!("{NODE_PREFIX}{path}").into_bytes()
}

fn attr_key(name: &str) -> Vec<u8> {
    format!("{ATTR_PREFIX}{name}").into_bytes()
}

fn db_exists(location: &Path) -> bool {
    location.join("CURRENT").is_file()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, RocksError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, RocksError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Opens RocksDB directories as stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocksBackend;

impl RocksBackend {
    pub fn new() -> Self {
        RocksBackend
    }

    fn options(create: bool) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(create);
        opts
    }
}

impl Backend for RocksBackend {
    fn open(&self, location: &Path, mode: OpenMode) -> Result<Arc<dyn Store>, StoreError> {
        let store = RocksStore::open(location, mode)?;
        Ok(Arc::new(store))
    }

    fn remove(&self, location: &Path) -> Result<(), StoreError> {
        if !self.exists(location) {
            return Err(StoreError::NoSuchFile(location.to_path_buf()));
        }
        DB::destroy(&Options::default(), location).map_err(RocksError::from)?;
        if location.exists() {
            std::fs::remove_dir_all(location)?;
        }
        debug!(location = %location.display(), "Removed RocksDB store");
        Ok(())
    }

    fn exists(&self, location: &Path) -> bool {
        db_exists(location)
    }
}

/// An open RocksDB store.
pub struct RocksStore {
    location: PathBuf,
    mode: OpenMode,
    db: RwLock<Option<DB>>,
}

impl RocksStore {
    /// Opens the store at `location`.
    ///
    /// `Create` wipes any existing database first, `Append` creates one if
    /// missing, and `ReadOnly` requires it to exist.
    pub fn open(location: impl AsRef<Path>, mode: OpenMode) -> Result<Self, StoreError> {
        let location = location.as_ref();
        let db = match mode {
            OpenMode::ReadOnly => {
                if !db_exists(location) {
                    return Err(StoreError::NoSuchFile(location.to_path_buf()));
                }
                DB::open_for_read_only(&RocksBackend::options(false), location, false)
            }
            OpenMode::Create => {
                if location.exists() {
                    DB::destroy(&Options::default(), location).map_err(RocksError::from)?;
                }
                DB::open(&RocksBackend::options(true), location)
            }
            OpenMode::Append => DB::open(&RocksBackend::options(true), location),
        }
        .map_err(RocksError::from)?;
        debug!(location = %location.display(), %mode, "Opened RocksDB store");

        Ok(Self {
            location: location.to_path_buf(),
            mode,
            db: RwLock::new(Some(db)),
        })
    }

    fn with_db<R>(&self, f: impl FnOnce(&DB) -> Result<R, RocksError>) -> Result<R, StoreError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard
            .as_ref()
            .ok_or_else(|| StoreError::Closed(self.location.clone()))?;
        Ok(f(db)?)
    }
}

impl EntryTable for RocksStore {
    fn table_location(&self) -> &Path {
        &self.location
    }

    fn table_mode(&self) -> OpenMode {
        self.mode
    }

    fn table_is_open(&self) -> bool {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn table_close(&self) -> Result<(), StoreError> {
        let db = self.db.write().unwrap_or_else(PoisonError::into_inner).take();
        drop(db);
        debug!(location = %self.location.display(), "Closed RocksDB store");
        Ok(())
    }

    fn table_flush(&self) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.flush()?))
    }

    fn table_get(&self, path: &NodePath) -> Result<Option<NodeEntry>, StoreError> {
        self.with_db(|db| match db.get_pinned(node_key(path))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        })
    }

    fn table_put(&self, path: &NodePath, entry: &NodeEntry) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.put(node_key(path), encode(entry)?)?))
    }

    fn table_delete(&self, path: &NodePath) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.delete(node_key(path))?))
    }

    fn table_descendants(&self, path: &NodePath) -> Result<Vec<NodePath>, StoreError> {
        let prefix = if path.is_root() {
            format!("{NODE_PREFIX}/")
        } else {
            format!("{NODE_PREFIX}{path}/")
        };
        self.with_db(|db| {
            let mut out = Vec::new();
            let iter = db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
            for item in iter {
                let (key, _) = item?;
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                let raw = std::str::from_utf8(&key[NODE_PREFIX.len()..])
                    .map_err(|_| RocksError::CorruptKey(String::from_utf8_lossy(&key).into_owned()))?;
                let child = NodePath::parse(raw).map_err(|_| RocksError::CorruptKey(raw.to_string()))?;
                out.push(child);
            }
            Ok(out)
        })
    }

    fn table_next_generation(&self) -> Result<u64, StoreError> {
        // The write lock serializes allocations within this handle.
        let guard = self.db.write().unwrap_or_else(PoisonError::into_inner);
        let db = guard
            .as_ref()
            .ok_or_else(|| StoreError::Closed(self.location.clone()))?;
        let current = match db.get(GENERATION_KEY).map_err(RocksError::from)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Codec("corrupt generation counter".into()))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        db.put(GENERATION_KEY, next.to_be_bytes())
            .map_err(RocksError::from)?;
        Ok(next)
    }

    fn table_get_attr(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.with_db(|db| match db.get_pinned(attr_key(name))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        })
    }

    fn table_put_attr(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.put(attr_key(name), encode(value)?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodemap_core::{Atom, CreateParams, Defaults, NodeKind, NodeParams, ReadRange};
    use tempfile::TempDir;

    fn temp_store() -> (Arc<dyn Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksBackend::new()
            .open(&dir.path().join("db"), OpenMode::Create)
            .unwrap();
        (store, dir)
    }

    fn earray_params() -> NodeParams {
        CreateParams {
            atom: Some(Atom::Int64),
            shape: Some(vec![0]),
            ..CreateParams::default()
        }
        .resolve(NodeKind::EArray, &Defaults::default())
        .unwrap()
    }

    fn path(raw: &str) -> NodePath {
        NodePath::parse(raw).unwrap()
    }

    #[test]
    fn create_append_read() {
        let (store, _dir) = temp_store();
        let node = store.create_node(&path("/a/b"), "e", &earray_params()).unwrap();
        store.append(&node, &[Value::Int(1), Value::Int(2)]).unwrap();

        assert_eq!(store.row_count(&node).unwrap(), 2);
        assert_eq!(
            store.read(&node, &ReadRange::all(), None).unwrap(),
            vec![Value::Int(1), Value::Int(2)]
        );
        assert_eq!(store.lookup_node(&path("/a")).unwrap().kind(), NodeKind::Group);
    }

    #[test]
    fn repeated_appends_rewrite_the_whole_entry() {
        let (store, _dir) = temp_store();
        let node = store.create_node(&path("/log"), "log", &earray_params()).unwrap();
        for batch in 0..20i64 {
            let rows: Vec<Value> = (0..50).map(|i| Value::Int(batch * 50 + i)).collect();
            store.append(&node, &rows).unwrap();
        }

        assert_eq!(store.row_count(&node).unwrap(), 1000);
        assert_eq!(
            store.read(&node, &ReadRange::all().start(-2), None).unwrap(),
            vec![Value::Int(998), Value::Int(999)]
        );
    }

    #[test]
    fn descendants_stop_at_the_prefix() {
        let (store, _dir) = temp_store();
        store.create_node(&path("/g"), "one", &earray_params()).unwrap();
        store.create_node(&path("/g/sub"), "two", &earray_params()).unwrap();
        store.create_node(&NodePath::root(), "gx", &earray_params()).unwrap();

        store.remove_node(&path("/g"), true).unwrap();
        assert!(!store.contains(&path("/g/sub/two")).unwrap());
        assert!(!store.contains(&path("/g")).unwrap());
        assert!(store.contains(&path("/gx")).unwrap());
    }

    #[test]
    fn persistence() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("db");
        let backend = RocksBackend::new();

        let stale = {
            let store = backend.open(&location, OpenMode::Create).unwrap();
            let node = store.create_node(&NodePath::root(), "e", &earray_params()).unwrap();
            store.append(&node, &[Value::Int(7)]).unwrap();
            store.set_attr("STORE_VERSION", Value::Int(42)).unwrap();
            store.close().unwrap();
            node
        };

        {
            let store = backend.open(&location, OpenMode::Append).unwrap();
            let node = store.lookup_node(&path("/e")).unwrap();
            assert_eq!(node, stale);
            assert_eq!(store.get_item(&node, &0.into()).unwrap(), Value::Int(7));
            assert_eq!(store.get_attr("STORE_VERSION").unwrap(), Some(Value::Int(42)));

            store.remove_node(node.path(), false).unwrap();
            let fresh = store.create_node(&NodePath::root(), "e", &earray_params()).unwrap();
            assert!(fresh.generation() > stale.generation());
            assert!(matches!(store.row_count(&stale), Err(StoreError::NodeNotFound(_))));
            store.close().unwrap();
        }
    }

    #[test]
    fn modes() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("db");
        let backend = RocksBackend::new();
        assert!(matches!(
            backend.open(&location, OpenMode::ReadOnly),
            Err(StoreError::NoSuchFile(_))
        ));

        let store = backend.open(&location, OpenMode::Create).unwrap();
        store.create_node(&NodePath::root(), "e", &earray_params()).unwrap();
        store.close().unwrap();
        assert!(matches!(store.contains(&path("/e")), Err(StoreError::Closed(_))));

        let reader = backend.open(&location, OpenMode::ReadOnly).unwrap();
        assert!(reader.contains(&path("/e")).unwrap());
        assert!(matches!(
            reader.create_node(&NodePath::root(), "f", &earray_params()),
            Err(StoreError::ReadOnly(_))
        ));
        reader.close().unwrap();

        let store = backend.open(&location, OpenMode::Create).unwrap();
        assert!(!store.contains(&path("/e")).unwrap());
        store.close().unwrap();

        backend.remove(&location).unwrap();
        assert!(!backend.exists(&location));
        assert!(backend.remove(&location).is_err());
    }
}
