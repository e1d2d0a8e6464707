//! Sliding-window sketching of graph traversals.
//!
//! Every reference path is walked base-by-base; each fixed-width window is
//! MinHash-sketched and emitted together with the sub-path of nodes it spans.
//! These window keys are what the LSH forest indexes.

use super::{Graph, SubPath};
use crate::errors::ArgotError;
use crate::sketch::sketch_sequence;
use fxhash::FxHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One sketched window of a graph traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowKey {
    pub graph_id: usize,
    /// Node holding the first base of the window.
    pub node: u64,
    /// 0-based offset into that node's sequence.
    pub offset: usize,
    /// Duplicate-collapsed node IDs traversed by the window.
    pub sub_path: SubPath,
    /// The reference path this window was derived from. Only used to
    /// differentiate windows that share an entry point but diverge inside.
    pub reference_path: usize,
    /// Stable string form; the forest indexes keys by this.
    pub id: String,
    /// MinHash sketch of the window; drained once the key enters the forest.
    pub sketch: Vec<u64>,
}

impl Graph {
    /// Slide a window over every reference path, sketching as we go.
    ///
    /// Paths are windowed in parallel. Windows sharing an entry point
    /// (node, offset) are de-duplicated: the first sub-path wins, and a later
    /// window is only kept when its sub-path differs, disambiguated by its
    /// reference path.
    pub fn window_graph(
        &self,
        window_size: usize,
        k: usize,
        sketch_size: usize,
        kmv: bool,
    ) -> Result<Vec<WindowKey>, ArgotError> {
        let per_path: Vec<Vec<WindowKey>> = self
            .path_ids()
            .into_par_iter()
            .map(|path_id| self.window_path(path_id, window_size, k, sketch_size, kmv))
            .collect::<Result<_, _>>()?;

        // de-duplicate across paths; path order keeps this deterministic
        let mut seen: FxHashMap<(u64, usize), Vec<SubPath>> = FxHashMap::default();
        let mut windows = Vec::new();
        for mut key in per_path.into_iter().flatten() {
            let entry = seen.entry((key.node, key.offset)).or_default();
            if entry.is_empty() {
                key.id = format!("{}:{}:{}", key.graph_id, key.node, key.offset);
            } else if entry.iter().any(|sp| *sp == key.sub_path) {
                continue;
            } else {
                key.id = format!(
                    "{}:{}:{}:{}",
                    key.graph_id, key.node, key.offset, key.reference_path
                );
            }
            entry.push(key.sub_path.clone());
            windows.push(key);
        }
        Ok(windows)
    }

    fn window_path(
        &self,
        path_id: usize,
        window_size: usize,
        k: usize,
        sketch_size: usize,
        kmv: bool,
    ) -> Result<Vec<WindowKey>, ArgotError> {
        let path_length = self.path_lengths.get(&path_id).copied().unwrap_or(0);
        if path_length < window_size {
            return Ok(Vec::new());
        }

        // for every base on the linear reference: which node holds it, at
        // what offset
        let mut segs: Vec<u64> = Vec::with_capacity(path_length);
        let mut offsets: Vec<usize> = Vec::with_capacity(path_length);
        for node in self.nodes.iter().flatten() {
            if node.path_ids.contains(&path_id) {
                for offset in 0..node.sequence.len() {
                    segs.push(node.segment_id);
                    offsets.push(offset);
                }
            }
        }
        let sequence = self.path_sequence(path_id);

        let mut windows = Vec::with_capacity(path_length - window_size + 1);
        for i in 0..=path_length - window_size {
            let sketch = sketch_sequence(&sequence[i..i + window_size], k, sketch_size, kmv, None)?;

            // collapse runs of identical node IDs into the sub-path
            let mut sub_path = SubPath::new();
            for &seg in &segs[i..i + window_size] {
                if sub_path.last() != Some(&seg) {
                    sub_path.push(seg);
                }
            }

            windows.push(WindowKey {
                graph_id: self.graph_id,
                node: segs[i],
                offset: offsets[i],
                sub_path,
                reference_path: path_id,
                id: String::new(),
                sketch,
            });
        }
        Ok(windows)
    }
}
