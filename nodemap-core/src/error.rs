use std::path::PathBuf;

use crate::params::NodeKind;
use crate::path::NodePath;
use crate::value::Value;

/// Errors raised by a [`Store`](crate::Store) implementation.
///
/// The mapping layer never translates these: they reach the caller wrapped
/// in [`MappingError::Store`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such node: {0}")]
    NodeNotFound(NodePath),
    #[error("node already exists: {0}")]
    NodeExists(NodePath),
    #[error("group {0} is not empty; use a recursive removal")]
    GroupNotEmpty(NodePath),
    #[error("{0} is not a group")]
    NotAGroup(NodePath),
    #[error("store {0} is opened read-only")]
    ReadOnly(PathBuf),
    #[error("store {0} is closed")]
    Closed(PathBuf),
    #[error("no such file: {0}")]
    NoSuchFile(PathBuf),
    #[error("invalid parameters for {path}: {reason}")]
    InvalidParams { path: NodePath, reason: String },
    #[error("type mismatch: expected {expected}, got {found:?}")]
    TypeMismatch { expected: String, found: Value },
    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("unbound condition variable: {0}")]
    UnboundVariable(String),
    #[error("{operation} is not supported on {kind} nodes")]
    Unsupported {
        operation: &'static str,
        kind: NodeKind,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by descriptors, bound node handles, the registry and
/// mapped files.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no store attached to {0}")]
    StoreNotAttached(NodePath),
    #[error("store version mismatch: expected {expected:?}, found {found:?}")]
    VersionMismatch { expected: Value, found: Value },
    #[error("invalid defaults file: {0}")]
    Config(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MappingError {
    /// Returns true if the error is a missing node reported by the store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MappingError::Store(StoreError::NodeNotFound(_)))
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        MappingError::Configuration(reason.into())
    }
}

pub type Result<T, E = MappingError> = std::result::Result<T, E>;
