//! Index-build pipeline: MSAs to variation graphs, graphs to sketched
//! windows, windows to the LSH forest.

use super::Process;
use crate::graph::gfa::{msa_to_gfa, read_msa};
use crate::graph::windows::WindowKey;
use crate::graph::Graph;
use crate::index::store::GraphStore;
use crate::index::LshForest;
use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::PathBuf;

/// Converts a list of MSA files into variation graphs.
pub struct MsaConverter {
    msa_files: Vec<PathBuf>,
    output: Option<Sender<Graph>>,
}

impl MsaConverter {
    pub fn new(msa_files: Vec<PathBuf>, output: Sender<Graph>) -> Self {
        MsaConverter {
            msa_files,
            output: Some(output),
        }
    }
}

impl Process for MsaConverter {
    fn run(&mut self) -> Result<()> {
        let output = self.output.take().context("MSA converter not connected")?;
        let progress = ProgressBar::new(self.msa_files.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("       {bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
                .expect("static template"),
        );

        // graph IDs follow file order; conversion runs in parallel
        let graphs: Vec<Graph> = self
            .msa_files
            .par_iter()
            .enumerate()
            .map(|(graph_id, path)| -> Result<Graph> {
                let msa = read_msa(path)?;
                let gfa = msa_to_gfa(&msa)
                    .context(format!("converting MSA {:?} to a graph", path))?;
                let graph = Graph::from_gfa(&gfa, graph_id)
                    .context(format!("building variation graph from {:?}", path))?;
                progress.inc(1);
                Ok(graph)
            })
            .collect::<Result<_>>()?;
        progress.finish_with_message("| MSAs converted");

        for graph in graphs {
            if output.send(graph).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Windows every graph traversal and sketches the windows.
pub struct GraphSketcher {
    window_size: usize,
    kmer_size: usize,
    sketch_size: usize,
    kmv: bool,
    input: Receiver<Graph>,
    windows_out: Option<Sender<WindowKey>>,
    store_out: Option<Sender<GraphStore>>,
}

impl GraphSketcher {
    pub fn new(
        window_size: usize,
        kmer_size: usize,
        sketch_size: usize,
        kmv: bool,
        input: Receiver<Graph>,
        windows_out: Sender<WindowKey>,
        store_out: Sender<GraphStore>,
    ) -> Self {
        GraphSketcher {
            window_size,
            kmer_size,
            sketch_size,
            kmv,
            input,
            windows_out: Some(windows_out),
            store_out: Some(store_out),
        }
    }
}

impl Process for GraphSketcher {
    fn run(&mut self) -> Result<()> {
        let windows_out = self.windows_out.take().context("sketcher not connected")?;
        let store_out = self.store_out.take().context("sketcher not connected")?;

        let mut store = GraphStore::default();
        for graph in self.input.iter() {
            let windows = graph
                .window_graph(self.window_size, self.kmer_size, self.sketch_size, self.kmv)
                .context(format!("windowing graph {}", graph.graph_id))?;
            for window in windows {
                if windows_out.send(window).is_err() {
                    break;
                }
            }
            store.insert(graph.graph_id, graph);
        }
        if store.is_empty() {
            bail!("could not create any graphs");
        }
        log::info!("\tnumber of variation graphs built: {}", store.len());

        // close the window stream before handing the store back
        drop(windows_out);
        let _ = store_out.send(store);
        Ok(())
    }
}

/// Collects sketched windows into the LSH forest and finalises it.
pub struct SketchIndexer {
    sketch_size: usize,
    jaccard_threshold: f64,
    input: Receiver<WindowKey>,
    forest_out: Option<Sender<LshForest>>,
}

impl SketchIndexer {
    pub fn new(
        sketch_size: usize,
        jaccard_threshold: f64,
        input: Receiver<WindowKey>,
        forest_out: Sender<LshForest>,
    ) -> Self {
        SketchIndexer {
            sketch_size,
            jaccard_threshold,
            input,
            forest_out: Some(forest_out),
        }
    }
}

impl Process for SketchIndexer {
    fn run(&mut self) -> Result<()> {
        let forest_out = self.forest_out.take().context("indexer not connected")?;
        let mut forest = LshForest::new(self.sketch_size, self.jaccard_threshold);
        let mut skipped: u64 = 0;
        for window in self.input.iter() {
            if !forest.add(window)? {
                skipped += 1;
            }
        }
        let (k, l) = forest.settings();
        log::info!("\tnumber of LSH forest buckets: {}", l);
        log::info!("\tnumber of hash functions per bucket: {}", k);
        log::info!("\tnumber of sketches in the LSH forest: {}", forest.len());
        if skipped > 0 {
            log::info!(
                "\twindows left unindexed (too few distinct k-mers to band): {}",
                skipped
            );
        }
        forest.index();
        let _ = forest_out.send(forest);
        Ok(())
    }
}
