use std::path::PathBuf;
use thiserror::Error;

/// Typed failures surfaced by the core components.
///
/// The pipeline layer wraps these in `anyhow` for reporting; only
/// `SequenceTooShort` is recoverable (the offending read is dropped).
#[derive(Debug, Error)]
pub enum ArgotError {
    /// Sequence shorter than the k-mer size; the caller drops the read.
    #[error("sequence length ({len}) is shorter than the k-mer length ({k})")]
    SequenceTooShort { len: usize, k: usize },

    #[error("segment name from GFA could not be converted to an integer: {0}")]
    InvalidSegmentName(String),

    #[error("graph contains duplicate nodes (identical segment IDs): {0}")]
    DuplicateSegment(u64),

    #[error("could not look up segment {0} in the graph")]
    UnknownSegment(u64),

    #[error("topological sort failed - graph contains a cycle or unreachable nodes")]
    TopoSortFailed,

    #[error("subpath encountered that does not include any segments")]
    EmptySubPath,

    #[error("covered bases across the subpath ({covered}) do not match the window size ({window})")]
    WindowBaseMismatch { covered: usize, window: usize },

    #[error("cannot add sketch: wrong size for index (expected {expected}, got {got})")]
    SketchSizeMismatch { expected: usize, got: usize },

    #[error("cannot add sketches once the LSH forest has been indexed")]
    IndexFinalised,

    #[error("cannot query the LSH forest before it has been indexed")]
    IndexNotFinalised,

    #[error("key not found in the LSH forest: {0}")]
    KeyNotFound(String),

    #[error("index was created with argot version {index}, but this is argot version {library}")]
    VersionMismatch { index: String, library: String },

    #[error("index directory is missing a required file: {0}")]
    MissingIndexFile(PathBuf),

    #[error("MSA sequences are not aligned to the same length")]
    UnalignedMsa,
}
