//! Haplotype-calling pipeline: read weighted GFAs back in, resolve path
//! abundances with EM, write the called haplotypes.

use super::Process;
use crate::graph::em::{resolve_haplotypes, EmOptions, EmResult};
use crate::graph::gfa::Gfa;
use crate::graph::Graph;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use fxhash::FxHashSet;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Reads weighted GFA graphs produced by the sketch pipeline.
pub struct GfaReader {
    inputs: Vec<PathBuf>,
    output: Option<Sender<Graph>>,
}

impl GfaReader {
    pub fn new(inputs: Vec<PathBuf>, output: Sender<Graph>) -> Self {
        GfaReader {
            inputs,
            output: Some(output),
        }
    }
}

impl Process for GfaReader {
    fn run(&mut self) -> Result<()> {
        let output = self.output.take().context("GFA reader not connected")?;
        let graphs: Vec<Graph> = self
            .inputs
            .par_iter()
            .enumerate()
            .map(|(graph_id, path)| -> Result<Graph> {
                let gfa = Gfa::from_file(path)?;
                Graph::from_gfa(&gfa, graph_id)
                    .context(format!("rebuilding weighted graph from {:?}", path))
            })
            .collect::<Result<_>>()?;
        for graph in graphs {
            if output.send(graph).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Runs the EM resolver over every weighted graph.
pub struct EmRunner {
    options: EmOptions,
    input: Receiver<Graph>,
    output: Option<Sender<(Graph, EmResult)>>,
}

impl EmRunner {
    pub fn new(options: EmOptions, input: Receiver<Graph>, output: Sender<(Graph, EmResult)>) -> Self {
        EmRunner {
            options,
            input,
            output: Some(output),
        }
    }
}

impl Process for EmRunner {
    fn run(&mut self) -> Result<()> {
        let output = self.output.take().context("EM runner not connected")?;
        for graph in self.input.iter() {
            // the graph's own k-mer total is the EM's observation count
            let result = resolve_haplotypes(&graph, graph.kmer_total, &self.options);
            if output.send((graph, result)).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Writes called haplotypes: a GFA restricted to the called paths plus a
/// FASTA listing of their sequences and abundances.
pub struct HaplotypeWriter {
    haplotype_dir: PathBuf,
    input: Receiver<(Graph, EmResult)>,
}

impl HaplotypeWriter {
    pub fn new(haplotype_dir: PathBuf, input: Receiver<(Graph, EmResult)>) -> Self {
        HaplotypeWriter {
            haplotype_dir,
            input,
        }
    }
}

impl Process for HaplotypeWriter {
    fn run(&mut self) -> Result<()> {
        log::info!("processing haplotypes...");
        let mut graphs: u64 = 0;
        let mut graphs_written: u64 = 0;
        let mut haplotypes: u64 = 0;
        let mut total_iterations: usize = 0;

        for (mut graph, result) in self.input.iter() {
            graphs += 1;
            total_iterations += result.iterations;
            if result.calls.is_empty() {
                // a graph that lost every path is reported, not failed
                log::info!("\tgraph {} has no called alleles after EM", graph.graph_id);
                continue;
            }

            log::info!(
                "\tgraph {} has {} called alleles after EM",
                graph.graph_id,
                result.calls.len()
            );
            for call in &result.calls {
                log::info!("\t- [{}] {:.3}", call.name, call.abundance);
            }

            // zero out the uncalled paths so the written GFA carries only the
            // called haplotypes
            let called: FxHashSet<usize> = result.calls.iter().map(|c| c.path_id).collect();
            for (path_id, length) in graph.path_lengths.iter_mut() {
                if !called.contains(path_id) {
                    *length = 0;
                }
            }

            let gfa_file = self
                .haplotype_dir
                .join(format!("argot-graph-{}-haplotype.gfa", graph.graph_id));
            if graph.save_gfa(&gfa_file)? {
                graphs_written += 1;
            }

            let fasta_file = gfa_file.with_extension("gfa.fna");
            let mut fasta = BufWriter::new(
                File::create(&fasta_file)
                    .context(format!("creating haplotype FASTA {:?}", fasta_file))?,
            );
            for call in &result.calls {
                haplotypes += 1;
                writeln!(fasta, ">{} abundance={:.3}", call.name, call.abundance)?;
                fasta.write_all(&graph.path_sequence(call.path_id))?;
                writeln!(fasta)?;
            }
        }

        if graphs > 0 {
            log::info!(
                "\tmean number of EM iterations: {}",
                total_iterations / graphs as usize
            );
        }
        log::info!("saved haplotypes to {:?}...", self.haplotype_dir);
        log::info!("\tnumber of graphs written to disk: {}", graphs_written);
        log::info!("\tnumber of haplotype sequences written: {}", haplotypes);
        log::info!("finished");
        Ok(())
    }
}
