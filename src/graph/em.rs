//! Haplotype resolution by expectation-maximisation.
//!
//! After pruning, the k-mers projected onto a graph are treated as draws from
//! a mixture over the surviving reference paths. Emission of a k-mer from a
//! path is proportional to the mass of the node carrying it, normalised
//! across the path's nodes; the mixture weights are the relative abundances
//! being estimated. K-mers carried by the same node share a responsibility,
//! so the E-step runs at node granularity with the node mass as its weight.

use super::Graph;
use fxhash::FxHashMap;

/// Maximum per-component change of the abundance vector at which the
/// estimate counts as converged.
const CONVERGENCE_TOL: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct EmOptions {
    /// Iterations to run before convergence may stop the loop.
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Paths with a final abundance below this are dropped.
    pub abundance_cutoff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaplotypeCall {
    pub path_id: usize,
    pub name: String,
    pub abundance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EmResult {
    pub iterations: usize,
    /// Surviving paths with renormalised abundances, most abundant first.
    pub calls: Vec<HaplotypeCall>,
}

/// Estimate relative abundances for the surviving paths of a weighted graph.
///
/// `total_kmers` is the number of k-mers projected onto the graph during
/// mapping. Failure to converge within `max_iterations` is not an error: the
/// last iterate is used. A graph with no surviving paths yields no calls.
pub fn resolve_haplotypes(graph: &Graph, total_kmers: f64, opts: &EmOptions) -> EmResult {
    let survivors = graph.surviving_path_ids();
    if survivors.is_empty() {
        return EmResult::default();
    }
    let dense: FxHashMap<usize, usize> = survivors
        .iter()
        .enumerate()
        .map(|(idx, &path_id)| (path_id, idx))
        .collect();

    // one observation per weighted node: (mass, surviving paths through it)
    let mut observations: Vec<(f64, Vec<usize>)> = Vec::new();
    let mut path_mass = vec![0.0f64; survivors.len()];
    for node in graph.nodes.iter().flatten() {
        if node.kmer_mass <= 0.0 {
            continue;
        }
        let members: Vec<usize> = node
            .path_ids
            .iter()
            .filter_map(|id| dense.get(id).copied())
            .collect();
        if members.is_empty() {
            continue;
        }
        for &j in &members {
            path_mass[j] += node.kmer_mass;
        }
        observations.push((node.kmer_mass, members));
    }

    let observed_mass: f64 = observations.iter().map(|(w, _)| w).sum();
    let norm = if total_kmers > 0.0 {
        total_kmers
    } else {
        observed_mass
    };
    if norm <= 0.0 {
        return EmResult::default();
    }

    let mut alpha = vec![1.0 / survivors.len() as f64; survivors.len()];
    let mut iterations = 0;
    for iteration in 1..=opts.max_iterations {
        iterations = iteration;
        let mut next = vec![0.0f64; survivors.len()];

        for (mass, members) in &observations {
            // responsibilities over the paths that carry this node's k-mers
            let mut denom = 0.0;
            for &j in members {
                if path_mass[j] > 0.0 {
                    denom += alpha[j] * (mass / path_mass[j]);
                }
            }
            if denom <= 0.0 {
                continue;
            }
            for &j in members {
                if path_mass[j] > 0.0 {
                    let resp = alpha[j] * (mass / path_mass[j]) / denom;
                    next[j] += mass * resp;
                }
            }
        }
        for weight in next.iter_mut() {
            *weight /= norm;
        }

        let delta = alpha
            .iter()
            .zip(next.iter())
            .map(|(old, new)| (old - new).abs())
            .fold(0.0f64, f64::max);
        alpha = next;
        if iteration >= opts.min_iterations && delta < CONVERGENCE_TOL {
            break;
        }
    }

    // drop sub-cutoff paths and renormalise the survivors
    let mut calls: Vec<HaplotypeCall> = survivors
        .iter()
        .zip(alpha.iter())
        .filter(|(_, &abundance)| abundance >= opts.abundance_cutoff)
        .map(|(&path_id, &abundance)| HaplotypeCall {
            path_id,
            name: String::from_utf8_lossy(&graph.paths[&path_id]).to_string(),
            abundance,
        })
        .collect();
    let kept_mass: f64 = calls.iter().map(|c| c.abundance).sum();
    if kept_mass > 0.0 {
        for call in calls.iter_mut() {
            call.abundance /= kept_mass;
        }
    }
    calls.sort_by(|a, b| b.abundance.total_cmp(&a.abundance));

    EmResult { iterations, calls }
}
