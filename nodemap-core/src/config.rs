use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::params::Filters;
use crate::value::ByteOrder;

pub const DEFAULT_EXPECTED_ROWS: u64 = 10_000;
pub const DEFAULT_EARRAY_EXPECTED_ROWS: u64 = 1_000;
/// Suggested chunk length for chunked arrays.
pub const DEFAULT_CHUNKSHAPE: usize = 100;
/// Suggested chunk shape for single-column nodes.
pub const DEFAULT_COLUMNS_CHUNKSHAPE: [usize; 1] = [1_000];

pub const DEFAULT_DATA_COMPLIB: &str = "blosc:lz4hc";
pub const DEFAULT_DATA_COMPLEVEL: u8 = 3;
pub const DEFAULT_INDEX_COMPLIB: &str = "blosc:lz4";
pub const DEFAULT_INDEX_COMPLEVEL: u8 = 3;

/// Compression policy for regular data.
pub fn default_data_filter() -> Filters {
    Filters::new(DEFAULT_DATA_COMPLIB, DEFAULT_DATA_COMPLEVEL)
}

/// Compression policy for indexes.
pub fn default_index_filter() -> Filters {
    Filters::new(DEFAULT_INDEX_COMPLIB, DEFAULT_INDEX_COMPLEVEL)
}

/// Fallback creation parameters, merged under every descriptor's overrides.
///
/// Loaded from TOML, e.g.
///
/// ```toml
/// title = "experiment"
/// track_times = false
///
/// [table]
/// expected_rows = 500
///
/// [earray.filters]
/// complib = "zlib"
/// complevel = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub title: String,
    pub track_times: bool,
    pub byteorder: Option<ByteOrder>,
    pub table: KindDefaults,
    pub array: KindDefaults,
    pub carray: KindDefaults,
    pub earray: KindDefaults,
    pub vlarray: KindDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindDefaults {
    pub expected_rows: Option<u64>,
    pub chunkshape: Option<Vec<usize>>,
    pub filters: Option<Filters>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            title: String::new(),
            track_times: true,
            byteorder: None,
            table: KindDefaults {
                expected_rows: Some(DEFAULT_EXPECTED_ROWS),
                ..KindDefaults::default()
            },
            array: KindDefaults::default(),
            carray: KindDefaults::default(),
            earray: KindDefaults {
                expected_rows: Some(DEFAULT_EARRAY_EXPECTED_ROWS),
                ..KindDefaults::default()
            },
            vlarray: KindDefaults::default(),
        }
    }
}

impl Defaults {
    pub fn from_toml_str(content: &str) -> Result<Self, MappingError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
