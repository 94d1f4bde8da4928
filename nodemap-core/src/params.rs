use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{Defaults, KindDefaults};
use crate::error::MappingError;
use crate::value::{Atom, ByteOrder, Description, Value};

/// The kind of a node in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Implicit parent group. Descriptors cannot declare one.
    Group,
    Table,
    Array,
    CArray,
    EArray,
    VLArray,
}

impl NodeKind {
    /// Kinds whose handles expose `append`.
    pub fn is_appendable(self) -> bool {
        matches!(self, NodeKind::Table | NodeKind::EArray | NodeKind::VLArray)
    }

    /// Creation parameters the store receives for this kind.
    pub fn forwarded_params(self) -> &'static [Param] {
        use Param as P;
        match self {
            NodeKind::Group => &[P::CreateParents],
            NodeKind::Table => &[
                P::Description,
                P::Title,
                P::Filters,
                P::ExpectedRows,
                P::ChunkShape,
                P::ByteOrder,
                P::CreateParents,
                P::Obj,
                P::TrackTimes,
            ],
            NodeKind::Array => &[
                P::Obj,
                P::Title,
                P::ByteOrder,
                P::CreateParents,
                P::Atom,
                P::Shape,
                P::TrackTimes,
            ],
            NodeKind::CArray => &[
                P::Atom,
                P::Shape,
                P::Title,
                P::Filters,
                P::ChunkShape,
                P::ByteOrder,
                P::CreateParents,
                P::Obj,
                P::TrackTimes,
            ],
            NodeKind::EArray => &[
                P::Atom,
                P::Shape,
                P::Title,
                P::Filters,
                P::ExpectedRows,
                P::ChunkShape,
                P::ByteOrder,
                P::CreateParents,
                P::Obj,
                P::TrackTimes,
            ],
            NodeKind::VLArray => &[
                P::Atom,
                P::Title,
                P::Filters,
                P::ExpectedRows,
                P::ChunkShape,
                P::ByteOrder,
                P::CreateParents,
                P::Obj,
                P::TrackTimes,
            ],
        }
    }

    pub fn forwards(self, param: Param) -> bool {
        self.forwarded_params().contains(&param)
    }

    fn defaults(self, defaults: &Defaults) -> Option<&KindDefaults> {
        match self {
            NodeKind::Group => None,
            NodeKind::Table => Some(&defaults.table),
            NodeKind::Array => Some(&defaults.array),
            NodeKind::CArray => Some(&defaults.carray),
            NodeKind::EArray => Some(&defaults.earray),
            NodeKind::VLArray => Some(&defaults.vlarray),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Names of the creation parameters, used for per-kind forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Description,
    Title,
    Filters,
    ExpectedRows,
    ChunkShape,
    ByteOrder,
    CreateParents,
    Obj,
    TrackTimes,
    Atom,
    Shape,
}

/// Compression policy recorded on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub complib: String,
    pub complevel: u8,
}

impl Filters {
    pub fn new(complib: impl Into<String>, complevel: u8) -> Self {
        Filters {
            complib: complib.into(),
            complevel,
        }
    }
}

/// Per-instance creation overrides. `None` falls back to the kind defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateParams {
    pub description: Option<Description>,
    pub atom: Option<Atom>,
    pub shape: Option<Vec<usize>>,
    pub title: Option<String>,
    pub byteorder: Option<ByteOrder>,
    pub expected_rows: Option<u64>,
    pub chunkshape: Option<Vec<usize>>,
    pub filters: Option<Filters>,
    pub track_times: Option<bool>,
    pub obj: Option<Value>,
}

/// Fully resolved parameters handed to [`Store::create_node`](crate::Store::create_node).
///
/// Only the fields a kind forwards are ever set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeParams {
    pub kind: NodeKind,
    pub title: String,
    pub byteorder: Option<ByteOrder>,
    pub track_times: bool,
    pub create_parents: bool,
    pub obj: Option<Value>,
    pub description: Option<Description>,
    pub atom: Option<Atom>,
    pub shape: Option<Vec<usize>>,
    pub filters: Option<Filters>,
    pub expected_rows: Option<u64>,
    pub chunkshape: Option<Vec<usize>>,
}

impl CreateParams {
    /// Merges the overrides over `defaults` and drops whatever `kind` does
    /// not forward.
    pub fn resolve(&self, kind: NodeKind, defaults: &Defaults) -> Result<NodeParams, MappingError> {
        let kind_defaults = kind.defaults(defaults).ok_or_else(|| {
            MappingError::configuration("groups are created implicitly and cannot be mapped")
        })?;
        let keep = |param: Param| kind.forwards(param);

        let filters = self.filters.clone().or_else(|| kind_defaults.filters.clone());
        if let Some(filters) = &filters {
            if filters.complevel > 9 {
                return Err(MappingError::configuration(format!(
                    "complevel {} is out of range 0..=9",
                    filters.complevel
                )));
            }
        }

        let params = NodeParams {
            kind,
            title: self.title.clone().unwrap_or_else(|| defaults.title.clone()),
            byteorder: self.byteorder.or(defaults.byteorder).filter(|_| keep(Param::ByteOrder)),
            track_times: self.track_times.unwrap_or(defaults.track_times),
            create_parents: true,
            obj: self.obj.clone().filter(|_| keep(Param::Obj)),
            description: self.description.clone().filter(|_| keep(Param::Description)),
            atom: self.atom.filter(|_| keep(Param::Atom)),
            shape: self.shape.clone().filter(|_| keep(Param::Shape)),
            filters: filters.filter(|_| keep(Param::Filters)),
            expected_rows: self
                .expected_rows
                .or(kind_defaults.expected_rows)
                .filter(|_| keep(Param::ExpectedRows)),
            chunkshape: self
                .chunkshape
                .clone()
                .or_else(|| kind_defaults.chunkshape.clone())
                .filter(|_| keep(Param::ChunkShape)),
        };
        params.validate_shapes()?;
        Ok(params)
    }
}

impl NodeParams {
    fn validate_shapes(&self) -> Result<(), MappingError> {
        if let Some(chunkshape) = &self.chunkshape {
            if chunkshape.is_empty() || chunkshape.contains(&0) {
                return Err(MappingError::configuration(format!(
                    "chunk shape {chunkshape:?} must be non-empty with positive extents"
                )));
            }
        }
        let Some(shape) = &self.shape else {
            return Ok(());
        };
        match self.kind {
            NodeKind::Array | NodeKind::CArray if shape.is_empty() || shape.contains(&0) => {
                Err(MappingError::configuration(format!(
                    "{} shape {shape:?} must have positive extents",
                    self.kind
                )))
            }
            NodeKind::EArray
                if shape.first() != Some(&0) || shape[1..].contains(&0) =>
            {
                Err(MappingError::configuration(format!(
                    "EArray shape {shape:?} needs exactly one extendable leading dimension of 0"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> CreateParams {
        CreateParams {
            description: Some(Description::new().field("A", Atom::Int64)),
            atom: Some(Atom::Int32),
            shape: Some(vec![100]),
            expected_rows: Some(100),
            chunkshape: Some(vec![10]),
            filters: Some(Filters::new("blosc:lz4hc", 3)),
            ..CreateParams::default()
        }
    }

    #[test]
    fn array_drops_table_only_params() {
        let params = overrides().resolve(NodeKind::Array, &Defaults::default()).unwrap();
        assert_eq!(params.atom, Some(Atom::Int32));
        assert_eq!(params.shape, Some(vec![100]));
        assert!(params.description.is_none());
        assert!(params.filters.is_none());
        assert!(params.expected_rows.is_none());
        assert!(params.chunkshape.is_none());
    }

    #[test]
    fn table_keeps_layout_and_drops_atom() {
        let params = overrides().resolve(NodeKind::Table, &Defaults::default()).unwrap();
        assert!(params.description.is_some());
        assert!(params.atom.is_none());
        assert!(params.shape.is_none());
        assert_eq!(params.expected_rows, Some(100));
        assert!(params.create_parents);
    }

    #[test]
    fn kind_defaults_fill_gaps() {
        let defaults = Defaults::default();
        let table = CreateParams::default().resolve(NodeKind::Table, &defaults).unwrap();
        let earray = CreateParams {
            shape: Some(vec![0]),
            ..CreateParams::default()
        }
        .resolve(NodeKind::EArray, &defaults)
        .unwrap();
        let vlarray = CreateParams::default().resolve(NodeKind::VLArray, &defaults).unwrap();

        assert_eq!(table.expected_rows, Some(10_000));
        assert_eq!(earray.expected_rows, Some(1_000));
        assert_eq!(vlarray.expected_rows, None);
        assert!(table.track_times);
        assert_eq!(table.title, "");
    }

    #[test]
    fn rejects_bad_shapes_and_filters() {
        let defaults = Defaults::default();
        let zero_carray = CreateParams {
            shape: Some(vec![0]),
            ..CreateParams::default()
        };
        assert!(zero_carray.resolve(NodeKind::CArray, &defaults).is_err());

        let fixed_earray = CreateParams {
            shape: Some(vec![10]),
            ..CreateParams::default()
        };
        assert!(fixed_earray.resolve(NodeKind::EArray, &defaults).is_err());

        let loud = CreateParams {
            filters: Some(Filters::new("zlib", 12)),
            ..CreateParams::default()
        };
        assert!(loud.resolve(NodeKind::Table, &defaults).is_err());
        assert!(CreateParams::default().resolve(NodeKind::Group, &defaults).is_err());
    }
}
