use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{MappingError, Result, StoreError};
use crate::registry::{Container, Registry};
use crate::store::{Backend, OpenMode, Store};
use crate::value::Value;

/// Root attribute holding the container's version tag.
pub const STORE_VERSION: &str = "STORE_VERSION";

/// A container bound to an open store file.
///
/// Owns the store; every handle in the container only holds a weak
/// reference to it. Dropping the file closes it.
pub struct MappedFile<C: Container> {
    backend: Arc<dyn Backend>,
    location: PathBuf,
    store: Option<Arc<dyn Store>>,
    registry: Registry,
    container: C,
}

impl<C: Container> MappedFile<C> {
    /// Opens `location` and binds every handle of `container` to it.
    ///
    /// In a writable mode all mapped nodes are created (or adopted) right
    /// away; read-only handles resolve lazily.
    #[instrument(skip_all, fields(location = %location.as_ref().display(), mode = %mode))]
    pub fn open(
        backend: Arc<dyn Backend>,
        location: impl AsRef<Path>,
        mode: OpenMode,
        container: C,
    ) -> Result<Self> {
        let mut file = MappedFile {
            backend,
            location: location.as_ref().to_path_buf(),
            store: None,
            registry: Registry::default(),
            container,
        };
        file.attach(location.as_ref(), mode)?;
        Ok(file)
    }

    /// Closes the current store and opens another one in its place.
    #[instrument(skip_all, fields(location = %location.as_ref().display(), mode = %mode))]
    pub fn reopen(&mut self, location: impl AsRef<Path>, mode: OpenMode) -> Result<()> {
        self.close()?;
        self.attach(location.as_ref(), mode)
    }

    fn attach(&mut self, location: &Path, mode: OpenMode) -> Result<()> {
        self.registry = Registry::scan(&mut self.container)?;
        let store = self.backend.open(location, mode)?;
        if let Err(err) = self.verify_version(store.as_ref()) {
            store.close()?;
            return Err(err);
        }
        self.location = location.to_path_buf();
        self.store = Some(Arc::clone(&store));
        let count = self
            .registry
            .rebind(&mut self.container, &store, mode.is_writable())?;
        debug!(count, "Opened store");
        Ok(())
    }

    fn verify_version(&self, store: &dyn Store) -> Result<()> {
        let Some(expected) = self.container.store_version() else {
            return Ok(());
        };
        match store.get_attr(STORE_VERSION)? {
            Some(found) if found != expected => Err(MappingError::VersionMismatch { expected, found }),
            _ => Ok(()),
        }
    }

    /// Writes the version tag, flushes, closes the store and detaches every
    /// handle. Closing a closed file does nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        debug!(location = %self.location.display(), "Closing store");
        let result = finish(store.as_ref(), self.container.store_version());
        self.registry.detach_all(&mut self.container);
        Ok(result?)
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.open_store()?.flush()?)
    }

    /// Closes the file and deletes it from the backend.
    pub fn remove_file(&mut self) -> Result<()> {
        self.close()?;
        debug!(location = %self.location.display(), "Removing store file");
        Ok(self.backend.remove(&self.location)?)
    }

    pub fn is_open(&self) -> bool {
        self.store.as_ref().is_some_and(|store| store.is_open())
    }

    /// Returns false once the file is closed.
    pub fn is_writable(&self) -> bool {
        self.store.as_ref().is_some_and(|store| store.is_writable())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Names of the mapped handles, in registration order.
    pub fn mapping_names(&self) -> Vec<&str> {
        self.registry.names().collect()
    }

    /// Reads a root attribute.
    pub fn attr(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.open_store()?.get_attr(name)?)
    }

    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        Ok(self.open_store()?.set_attr(name, value.into())?)
    }

    fn open_store(&self) -> Result<&Arc<dyn Store>> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Closed(self.location.clone()).into())
    }
}

fn finish(store: &dyn Store, version: Option<Value>) -> std::result::Result<(), StoreError> {
    if store.is_writable() && store.is_open() {
        if let Some(version) = version {
            store.set_attr(STORE_VERSION, version)?;
        }
        store.flush()?;
    }
    store.close()
}

impl<C: Container> Deref for MappedFile<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.container
    }
}

/// Handles assigned into the container while the file is open stay unbound
/// until the next [`MappedFile::reopen`], which scans the container again.
impl<C: Container> DerefMut for MappedFile<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.container
    }
}

impl<C: Container> Drop for MappedFile<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(location = %self.location.display(), error = %err, "Failed to close store");
        }
    }
}
