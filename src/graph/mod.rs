//! Variation graph model.
//!
//! Each reference cluster is a topologically sorted DAG. Nodes carry a
//! sequence fragment, the set of reference paths that traverse them, an
//! approximate k-mer weight and a base-coverage bit vector. Nodes reference
//! their successors by segment ID, never by pointer; the graph owns the node
//! array and an `O(1)` lookup from segment ID to array position.

pub mod em;
pub mod gfa;
pub mod windows;

use crate::bitvec::BitVec;
use crate::errors::ArgotError;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use self::gfa::Gfa;

/// Ordered, duplicate-collapsed list of node IDs traversed by one window.
pub type SubPath = SmallVec<[u64; 8]>;

/// Normalise a base: upper-case, anything outside `ACGTN` becomes `N`.
#[inline]
pub fn normalise_base(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b @ (b'A' | b'C' | b'G' | b'T' | b'N') => b,
        _ => b'N',
    }
}

/// A GFA segment plus the path, weight and coverage info attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub segment_id: u64,
    pub sequence: Vec<u8>,
    /// Successor segment IDs, held in descending order (the traversal
    /// tie-break used by the topological sort).
    pub out_edges: Vec<u64>,
    /// Reference paths that traverse this node (keys into `Graph::paths`).
    pub path_ids: Vec<usize>,
    /// Share of the k-mers from projected read sketches.
    pub kmer_mass: f64,
    /// Bit `i` set iff base `i` of this node was covered by a mapped window.
    pub coverage: BitVec,
}

impl Node {
    fn new(segment_id: u64, sequence: Vec<u8>, kmer_mass: f64) -> Self {
        let coverage = BitVec::new(sequence.len());
        Node {
            segment_id,
            sequence,
            out_edges: Vec::new(),
            path_ids: Vec::new(),
            kmer_mass,
            coverage,
        }
    }

    /// Mark bases `[start, end)` as covered, clamped to the node length.
    fn add_coverage(&mut self, start: usize, end: usize) {
        self.coverage.set_range(start, end);
    }

    /// Fraction of this node's bases covered by mapped windows.
    pub fn base_coverage(&self) -> f64 {
        self.coverage.count_ones() as f64 / self.sequence.len() as f64
    }
}

/// A variation graph for one reference cluster.
///
/// `nodes` is kept in topological order. Pruning replaces dead nodes with
/// `None` so that array positions, and therefore the segment-ID lookup,
/// remain valid; all scans tolerate the sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub graph_id: usize,
    pub nodes: Vec<Option<Node>>,
    pub node_lookup: FxHashMap<u64, usize>,
    /// Path ID to path name.
    pub paths: FxHashMap<usize, Vec<u8>>,
    /// Path ID to reference length in bases. Pruned paths keep their entry
    /// with the length zeroed, preserving the numbering.
    pub path_lengths: FxHashMap<usize, usize>,
    /// Cumulative k-mers projected onto this graph.
    pub kmer_total: f64,
    pub pruned: bool,
}

impl Graph {
    /// Build a graph from a parsed GFA instance and topologically sort it.
    ///
    /// Segment names must convert to integers; bases are normalised; links
    /// become out-edges and paths are registered on every node they traverse.
    /// A `KC:i:` optional field on a segment restores its k-mer mass (used
    /// when re-loading weighted graphs).
    pub fn from_gfa(gfa: &Gfa, graph_id: usize) -> Result<Self, ArgotError> {
        let mut graph = Graph {
            graph_id,
            ..Graph::default()
        };

        // segments -> nodes, in file order
        for segment in &gfa.segments {
            let seg_id: u64 = segment
                .name
                .parse()
                .map_err(|_| ArgotError::InvalidSegmentName(segment.name.clone()))?;
            if graph.node_lookup.contains_key(&seg_id) {
                return Err(ArgotError::DuplicateSegment(seg_id));
            }
            let sequence: Vec<u8> = segment.sequence.iter().map(|&b| normalise_base(b)).collect();
            let node = Node::new(seg_id, sequence, segment.kmer_count.unwrap_or(0) as f64);
            graph.node_lookup.insert(seg_id, graph.nodes.len());
            graph.nodes.push(Some(node));
        }

        // links -> out-edges
        for link in &gfa.links {
            let from: u64 = link
                .from
                .parse()
                .map_err(|_| ArgotError::InvalidSegmentName(link.from.clone()))?;
            let to: u64 = link
                .to
                .parse()
                .map_err(|_| ArgotError::InvalidSegmentName(link.to.clone()))?;
            if !graph.node_lookup.contains_key(&to) {
                return Err(ArgotError::UnknownSegment(to));
            }
            let slot = *graph
                .node_lookup
                .get(&from)
                .ok_or(ArgotError::UnknownSegment(from))?;
            let node = graph.nodes[slot].as_mut().expect("node slot filled above");
            if !node.out_edges.contains(&to) {
                node.out_edges.push(to);
            }
        }

        // paths -> per-node path IDs; remember each path's first node for the sort
        let mut start_nodes = Vec::with_capacity(gfa.paths.len());
        for (path_id, path) in gfa.paths.iter().enumerate() {
            graph.paths.insert(path_id, path.name.clone().into_bytes());
            for (i, seg_name) in path.segments.iter().enumerate() {
                let seg_id: u64 = seg_name
                    .parse()
                    .map_err(|_| ArgotError::InvalidSegmentName(seg_name.clone()))?;
                let slot = *graph
                    .node_lookup
                    .get(&seg_id)
                    .ok_or(ArgotError::UnknownSegment(seg_id))?;
                let node = graph.nodes[slot].as_mut().expect("node slot filled above");
                if !node.path_ids.contains(&path_id) {
                    node.path_ids.push(path_id);
                }
                if i == 0 {
                    start_nodes.push(seg_id);
                }
            }
        }

        // descending successor order is the stable traversal tie-break
        for node in graph.nodes.iter_mut().flatten() {
            node.out_edges.sort_unstable_by(|a, b| b.cmp(a));
        }

        if graph.nodes.len() > 1 {
            graph.topo_sort(&start_nodes)?;
        }

        // record the linear reference length of every path
        for path_id in graph.path_ids() {
            let length = graph.path_sequence(path_id).len();
            graph.path_lengths.insert(path_id, length);
        }

        graph.kmer_total = graph
            .nodes
            .iter()
            .flatten()
            .map(|n| n.kmer_mass)
            .sum();

        Ok(graph)
    }

    /// Topologically sort the node array. Depth-first from the first node of
    /// each path, successors visited in descending segment-ID order, nodes
    /// prepended on completion. Fails on cycles or unreachable nodes.
    fn topo_sort(&mut self, start_nodes: &[u64]) -> Result<(), ArgotError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let edges_of: FxHashMap<u64, Vec<u64>> = self
            .nodes
            .iter()
            .flatten()
            .map(|n| (n.segment_id, n.out_edges.clone()))
            .collect();

        let mut marks: FxHashMap<u64, Mark> =
            edges_of.keys().map(|&id| (id, Mark::New)).collect();
        let mut finished: Vec<u64> = Vec::with_capacity(edges_of.len());

        for &start in start_nodes {
            if marks.get(&start).copied() != Some(Mark::New) {
                continue;
            }
            // (node, index of the next out-edge to follow)
            let mut stack: Vec<(u64, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::Open);
            while let Some(&(node, edge_idx)) = stack.last() {
                let edges = &edges_of[&node];
                if edge_idx < edges.len() {
                    let next = edges[edge_idx];
                    stack.last_mut().expect("stack checked non-empty").1 += 1;
                    match marks.get(&next).copied() {
                        Some(Mark::New) => {
                            marks.insert(next, Mark::Open);
                            stack.push((next, 0));
                        }
                        Some(Mark::Open) => return Err(ArgotError::TopoSortFailed),
                        Some(Mark::Done) => {}
                        None => return Err(ArgotError::UnknownSegment(next)),
                    }
                } else {
                    stack.pop();
                    marks.insert(node, Mark::Done);
                    finished.push(node);
                }
            }
        }

        // every node must have been reached from some path start
        if finished.len() != edges_of.len() {
            return Err(ArgotError::TopoSortFailed);
        }
        finished.reverse();

        // rebuild the node array in sorted order and refresh the lookup
        let mut by_id: FxHashMap<u64, Node> = self
            .nodes
            .drain(..)
            .flatten()
            .map(|n| (n.segment_id, n))
            .collect();
        self.node_lookup.clear();
        for (slot, seg_id) in finished.iter().enumerate() {
            let node = by_id.remove(seg_id).expect("sorted IDs come from the node set");
            self.node_lookup.insert(*seg_id, slot);
            self.nodes.push(Some(node));
        }
        Ok(())
    }

    /// All registered path IDs, ascending.
    pub fn path_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.paths.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Path IDs that still have a non-zero reference length.
    pub fn surviving_path_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .path_lengths
            .iter()
            .filter(|(_, &len)| len > 0)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn node(&self, segment_id: u64) -> Option<&Node> {
        self.node_lookup
            .get(&segment_id)
            .and_then(|&slot| self.nodes[slot].as_ref())
    }

    /// Linear reference sequence for a path: node fragments concatenated in
    /// topological order, restricted to nodes the path traverses.
    pub fn path_sequence(&self, path_id: usize) -> Vec<u8> {
        let mut sequence = Vec::new();
        for node in self.nodes.iter().flatten() {
            if node.path_ids.contains(&path_id) {
                sequence.extend_from_slice(&node.sequence);
            }
        }
        sequence
    }

    /// Project one mapped window onto the graph.
    ///
    /// The window entered the first node of `sub_path` at `offset`, spans
    /// `window_size` bases and contributed `window_size - k + 1` k-mers. Each
    /// node on the sub-path receives the share of those k-mers proportional
    /// to the window bases it holds, and those bases are marked as covered.
    pub fn increment_sub_path(
        &mut self,
        sub_path: &[u64],
        offset: usize,
        window_size: usize,
        k: usize,
    ) -> Result<(), ArgotError> {
        if sub_path.is_empty() {
            return Err(ArgotError::EmptySubPath);
        }
        if window_size < k {
            return Err(ArgotError::SequenceTooShort {
                len: window_size,
                k,
            });
        }
        let num_kmers = (window_size - k + 1) as f64;

        // one segment holds the whole window
        if sub_path.len() == 1 {
            let slot = *self
                .node_lookup
                .get(&sub_path[0])
                .ok_or(ArgotError::UnknownSegment(sub_path[0]))?;
            let node = self.nodes[slot]
                .as_mut()
                .ok_or(ArgotError::UnknownSegment(sub_path[0]))?;
            node.add_coverage(offset, offset + window_size);
            node.kmer_mass += num_kmers;
            self.kmer_total += num_kmers;
            return Ok(());
        }

        // otherwise each segment takes its share of the window's k-mers
        let mut total_bases = 0usize;
        let last = sub_path.len() - 1;
        for (i, seg_id) in sub_path.iter().enumerate() {
            let slot = *self
                .node_lookup
                .get(seg_id)
                .ok_or(ArgotError::UnknownSegment(*seg_id))?;
            let node = self.nodes[slot]
                .as_mut()
                .ok_or(ArgotError::UnknownSegment(*seg_id))?;
            let node_len = node.sequence.len();

            let covered = if i == 0 {
                // entry node: only the bases past the window's entry offset
                if offset >= node_len {
                    return Err(ArgotError::WindowBaseMismatch {
                        covered: 0,
                        window: window_size,
                    });
                }
                node.add_coverage(offset, node_len);
                node_len - offset
            } else if i == last {
                // final node: whatever the window has not yet accounted for
                let remaining = window_size.checked_sub(total_bases).ok_or(
                    ArgotError::WindowBaseMismatch {
                        covered: total_bases,
                        window: window_size,
                    },
                )?;
                let covered = remaining.min(node_len);
                node.add_coverage(0, covered);
                covered
            } else {
                // interior nodes are spanned end to end
                node.add_coverage(0, node_len);
                node_len
            };

            node.kmer_mass += (covered as f64 / window_size as f64) * num_kmers;
            total_bases += covered;
        }

        if total_bases != window_size {
            return Err(ArgotError::WindowBaseMismatch {
                covered: total_bases,
                window: window_size,
            });
        }
        self.kmer_total += num_kmers;
        Ok(())
    }

    /// Drop paths and segments with insufficient coverage.
    ///
    /// A node dies when its per-base k-mer mass falls below `min_kmer_cov`
    /// (strictly below: a node sitting exactly on the threshold is kept) or
    /// its base coverage falls below `min_base_cov`. Every path through a
    /// dead node dies with it. Returns `false` when no path would survive,
    /// in which case the graph is left untouched for the caller to discard.
    pub fn prune(&mut self, min_kmer_cov: f64, min_base_cov: f64) -> bool {
        let mut dead_paths: Vec<usize> = Vec::new();
        let mut dead_nodes: Vec<u64> = Vec::new();

        for node in self.nodes.iter().flatten() {
            let node_cov = node.kmer_mass / node.sequence.len() as f64;
            if node_cov < min_kmer_cov || node.base_coverage() < min_base_cov {
                dead_nodes.push(node.segment_id);
                for &path_id in &node.path_ids {
                    if !dead_paths.contains(&path_id) {
                        dead_paths.push(path_id);
                    }
                }
            }
        }

        if dead_paths.len() == self.paths.len() && !self.paths.is_empty() {
            return false;
        }
        if dead_nodes.is_empty() {
            return true;
        }

        for slot in 0..self.nodes.len() {
            let Some(node) = self.nodes[slot].as_mut() else {
                continue;
            };
            node.path_ids.retain(|id| !dead_paths.contains(id));
            if dead_nodes.contains(&node.segment_id) {
                let seg_id = node.segment_id;
                self.node_lookup.remove(&seg_id);
                self.nodes[slot] = None;
                continue;
            }
            node.out_edges.retain(|edge| !dead_nodes.contains(edge));
        }

        // names stay registered; a zero length marks the path as dead
        for path_id in &dead_paths {
            if let Some(length) = self.path_lengths.get_mut(path_id) {
                *length = 0;
            }
        }
        self.pruned = true;
        true
    }
}
