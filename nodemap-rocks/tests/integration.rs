//! Mapped containers over RocksDB directories.

use std::sync::Arc;

use nodemap_core::{
    col, Atom, Backend, CondVars, Container, Description, Descriptor, EArray, MappedFile, Mapping,
    MappingError, NodeKind, OpenMode, ReadRange, StoreError, Table, Value, VLArray, STORE_VERSION,
};
use nodemap_rocks::RocksBackend;
use tempfile::TempDir;

struct Experiment {
    events: Table,
    samples: EArray,
    bursts: VLArray,
}

impl Container for Experiment {
    fn mappings(&mut self) -> Vec<&mut dyn Mapping> {
        vec![&mut self.events, &mut self.samples, &mut self.bursts]
    }

    fn store_version(&self) -> Option<Value> {
        Some(Value::from("2"))
    }
}

fn experiment() -> Experiment {
    let events = Descriptor::builder(NodeKind::Table, "events")
        .parent("/run/1")
        .description(
            Description::new()
                .field("id", Atom::Int64)
                .field("energy", Atom::Float64)
                .field("valid", Atom::Bool),
        )
        .build()
        .unwrap();
    let samples = Descriptor::builder(NodeKind::EArray, "samples")
        .parent("/run/1")
        .atom(Atom::Float32)
        .shape(&[0, 2])
        .build()
        .unwrap();
    let bursts = Descriptor::builder(NodeKind::VLArray, "bursts")
        .path("/run/1/raw_bursts")
        .atom(Atom::Int32)
        .build()
        .unwrap();
    Experiment {
        events: Table::new(Arc::new(events)).unwrap(),
        samples: EArray::new(Arc::new(samples)).unwrap(),
        bursts: VLArray::new(Arc::new(bursts)).unwrap(),
    }
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let location = dir.path().join("experiment");
    let backend = Arc::new(RocksBackend::new());

    {
        let mut file =
            MappedFile::open(backend.clone(), &location, OpenMode::Create, experiment()).unwrap();
        file.events
            .append([(1i64, 0.5, true), (2, 7.25, false), (3, 12.0, true)])
            .unwrap();
        file.samples
            .append([Value::array([0.5f32, 1.5]), Value::array([2.5f32, 3.5])])
            .unwrap();
        file.bursts.append(vec![1, 2, 3]).unwrap();
    }

    let mut file =
        MappedFile::open(backend, &location, OpenMode::ReadOnly, experiment()).unwrap();
    assert_eq!(file.attr(STORE_VERSION).unwrap(), Some(Value::from("2")));
    assert_eq!(file.events.row_count().unwrap(), 3);
    assert_eq!(file.samples.row_count().unwrap(), 2);
    assert_eq!(file.bursts.get(0).unwrap(), Value::array([1, 2, 3]));

    let valid = file
        .events
        .read_where(&col("valid").eq(true), &CondVars::new(), Some("id"), &ReadRange::all())
        .unwrap();
    assert_eq!(valid, vec![Value::Int(1), Value::Int(3)]);
    assert_eq!(
        file.samples.get(1).unwrap(),
        Value::array([2.5f32, 3.5])
    );
}

#[test]
fn append_mode_adopts_and_extends() {
    let dir = TempDir::new().unwrap();
    let location = dir.path().join("experiment");
    let backend = Arc::new(RocksBackend::new());

    let mut file =
        MappedFile::open(backend, &location, OpenMode::Create, experiment()).unwrap();
    file.events.append([(1i64, 1.0, true)]).unwrap();

    file.reopen(&location, OpenMode::Append).unwrap();
    file.events.append([(2i64, 2.0, false)]).unwrap();
    assert_eq!(file.events.row_count().unwrap(), 2);
    assert_eq!(
        file.events.read(&ReadRange::all(), Some("id")).unwrap(),
        vec![Value::Int(1), Value::Int(2)]
    );
}

struct Future;

impl Container for Future {
    fn mappings(&mut self) -> Vec<&mut dyn Mapping> {
        Vec::new()
    }

    fn store_version(&self) -> Option<Value> {
        Some(Value::from("3"))
    }
}

#[test]
fn version_mismatch_and_removal() {
    let dir = TempDir::new().unwrap();
    let location = dir.path().join("experiment");
    let backend = Arc::new(RocksBackend::new());

    drop(MappedFile::open(backend.clone(), &location, OpenMode::Create, experiment()).unwrap());
    assert!(matches!(
        MappedFile::open(backend.clone(), &location, OpenMode::ReadOnly, Future),
        Err(MappingError::VersionMismatch { .. })
    ));

    let mut file =
        MappedFile::open(backend.clone(), &location, OpenMode::Append, experiment()).unwrap();
    file.remove_file().unwrap();
    assert!(!backend.exists(&location));
    assert!(matches!(
        file.reopen(&location, OpenMode::ReadOnly),
        Err(MappingError::Store(StoreError::NoSuchFile(_)))
    ));
}
