//! File-backed graph persistence.
//!
//! The format follows the file extension:
//! ```text
//! graph.json      - JSON document
//! graph.cbor.zst  - CBOR token stream in a zstd frame
//! ```

use crate::error::Result;
use crate::format::{
    BinaryReader, BinaryWriter, Format, FormatReader, FormatWriter, JsonReader, JsonWriter,
    PersistConfig,
};
use crate::reader::{LoadedGraph, read_graph};
use crate::writer::{WriteSummary, write_graph};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use stowage_kernel::{StorableRef, TypeRegistry};
use tracing::info;

/// Adapter writing to a freshly created file at `path`.
pub fn open_writer(
    path: impl AsRef<Path>,
    config: &PersistConfig,
) -> Result<Box<dyn FormatWriter>> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let file = BufWriter::new(File::create(path)?);
    Ok(match format {
        Format::Json => Box::new(JsonWriter::new(file).pretty(config.pretty)),
        Format::Binary => Box::new(BinaryWriter::new(file, config.compression_level)),
    })
}

/// Adapter reading the file at `path`.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn FormatReader>> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let file = BufReader::new(File::open(path)?);
    Ok(match format {
        Format::Json => Box::new(JsonReader::new(file)),
        Format::Binary => Box::new(BinaryReader::new(file)),
    })
}

/// Write `roots` and everything they reach to `path`.
pub fn save(
    path: impl AsRef<Path>,
    roots: &[StorableRef],
    config: &PersistConfig,
) -> Result<WriteSummary> {
    let path = path.as_ref();
    let mut writer = open_writer(path, config)?;
    let summary = write_graph(writer.as_mut(), roots)?;
    info!(path = %path.display(), objects = summary.objects, "saved graph file");
    Ok(summary)
}

/// Load the graph stored at `path`, recreating objects through `registry`.
pub fn load(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<LoadedGraph> {
    let path = path.as_ref();
    let mut reader = open_reader(path)?;
    let graph = read_graph(reader.as_mut(), registry)?;
    info!(path = %path.display(), objects = graph.len(), "loaded graph file");
    Ok(graph)
}

/// [`load`] against a snapshot of the process-wide registry.
///
/// The read guard is released before loading, so `from_stored` may itself
/// register types. Those registrations apply to later loads only.
pub fn load_global(path: impl AsRef<Path>) -> Result<LoadedGraph> {
    let registry = stowage_kernel::global().clone();
    load(path, &registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::testing::{Node, describe, node, registry};
    use std::rc::Rc;
    use stowage_common::StorableId;

    fn sample() -> Vec<StorableRef> {
        let a = node("a", "alpha");
        let b = node("b", "beta");
        let c = node("c", "gamma");
        Node::link(&a, &c);
        Node::link(&b, &c);
        Node::link(&c, &a);
        vec![a, b]
    }

    #[test]
    fn save_and_load_each_format() {
        let tmp = tempfile::tempdir().unwrap();
        for format in Format::ALL {
            let path = tmp.path().join(format!("graph.{}", format.extension()));
            let summary = save(&path, &sample(), &PersistConfig::default()).unwrap();
            assert_eq!(summary.objects, 3);

            let graph = load(&path, &registry()).unwrap();
            assert_eq!(graph.roots(), [StorableId::from("a"), StorableId::from("b")]);
            assert_eq!(graph.len(), 3);
            assert_eq!(
                describe(graph.get(&"c".into()).unwrap()),
                ("gamma".to_string(), vec!["a".to_string()])
            );
            let a = graph.get_as::<Node>(&"a".into()).unwrap();
            let b = graph.get_as::<Node>(&"b".into()).unwrap();
            assert!(Rc::ptr_eq(&a.links[0], &b.links[0]), "{}", format.name());
        }
    }

    #[test]
    fn compact_json_is_smaller() {
        let tmp = tempfile::tempdir().unwrap();
        let pretty = tmp.path().join("pretty.json");
        let compact = tmp.path().join("compact.json");
        save(&pretty, &sample(), &PersistConfig::default()).unwrap();
        let config = PersistConfig {
            pretty: false,
            ..PersistConfig::default()
        };
        save(&compact, &sample(), &config).unwrap();

        let pretty = std::fs::metadata(pretty).unwrap().len();
        let compact = std::fs::metadata(compact).unwrap().len();
        assert!(compact < pretty);
    }

    #[test]
    fn unknown_extension_is_refused_before_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph.xml");
        let err = save(&path, &sample(), &PersistConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedFormat(_)));
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(tmp.path().join("absent.json"), &registry()).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
