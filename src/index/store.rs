//! On-disk index layout and version guard.
//!
//! An index directory holds three artefacts: the graph store, the finalised
//! LSH forest and the info record with the build parameters. All three must
//! be present, and each carries the library version it was written by;
//! loading with a different version fails before any graph is constructed.

use super::LshForest;
use crate::errors::ArgotError;
use crate::graph::Graph;
use anyhow::{Context, Result};
use fxhash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub const GRAPH_FILE: &str = "index.graph";
pub const FOREST_FILE: &str = "index.sketches";
pub const INFO_FILE: &str = "index.info";

/// All graphs of an index, keyed by graph ID.
pub type GraphStore = FxHashMap<usize, Graph>;

/// Build parameters persisted alongside the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub version: String,
    pub kmer_size: usize,
    pub sketch_size: usize,
    pub kmv_sketch: bool,
    pub jaccard_threshold: f64,
    pub window_size: usize,
}

impl IndexInfo {
    pub fn new(
        kmer_size: usize,
        sketch_size: usize,
        kmv_sketch: bool,
        jaccard_threshold: f64,
        window_size: usize,
    ) -> Self {
        IndexInfo {
            version: crate::VERSION.to_string(),
            kmer_size,
            sketch_size,
            kmv_sketch,
            jaccard_threshold,
            window_size,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Versioned<T> {
    version: String,
    payload: T,
}

fn check_version(version: &str) -> Result<(), ArgotError> {
    if version != crate::VERSION {
        return Err(ArgotError::VersionMismatch {
            index: version.to_string(),
            library: crate::VERSION.to_string(),
        });
    }
    Ok(())
}

fn dump<T: Serialize>(path: &Path, version: &str, payload: &T) -> Result<()> {
    let fh = File::create(path).context(format!("creating index file {:?}", path))?;
    bincode::serialize_into(
        BufWriter::new(fh),
        &Versioned {
            version: version.to_string(),
            payload,
        },
    )
    .context(format!("serialising index file {:?}", path))
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let fh = File::open(path).context(format!("opening index file {:?}", path))?;
    let wrapped: Versioned<T> = bincode::deserialize_from(BufReader::new(fh))
        .context(format!("deserialising index file {:?}", path))?;
    check_version(&wrapped.version)?;
    Ok(wrapped.payload)
}

/// Write the three index artefacts into `dir`.
pub fn save_index(
    dir: &Path,
    info: &IndexInfo,
    store: &GraphStore,
    forest: &LshForest,
) -> Result<()> {
    dump(&dir.join(INFO_FILE), &info.version, info)?;
    dump(&dir.join(GRAPH_FILE), &info.version, store)?;
    dump(&dir.join(FOREST_FILE), &info.version, forest)?;
    Ok(())
}

/// Check that `dir` holds a complete index and read the info record,
/// enforcing the version guard before anything else is touched.
pub fn load_info(dir: &Path) -> Result<IndexInfo> {
    for file in [INFO_FILE, GRAPH_FILE, FOREST_FILE] {
        let path = dir.join(file);
        if !path.is_file() {
            return Err(ArgotError::MissingIndexFile(path).into());
        }
    }
    let info: IndexInfo = load(&dir.join(INFO_FILE))?;
    check_version(&info.version)?;
    Ok(info)
}

/// Load a complete index directory.
pub fn load_index(dir: &Path) -> Result<(IndexInfo, GraphStore, LshForest)> {
    let info = load_info(dir)?;
    let store: GraphStore = load(&dir.join(GRAPH_FILE))?;
    let forest: LshForest = load(&dir.join(FOREST_FILE))?;
    Ok((info, store, forest))
}
