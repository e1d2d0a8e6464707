//! Read-mapping pipeline: stream reads, sketch and query them against the
//! LSH forest, project hits onto the graphs, then prune.

use super::{Process, BUFFER_SIZE};
use crate::cli::counters::{MapCounters, PruneCounters};
use crate::errors::ArgotError;
use crate::graph::SubPath;
use crate::index::store::GraphStore;
use crate::index::LshForest;
use crate::sketch::bloom::BloomFilter;
use crate::sketch::sketch_sequence;
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use fxhash::FxHashMap;
use std::path::PathBuf;

/// Streams raw read sequences from FASTA/FASTQ files (gzip transparent), or
/// from stdin when no file is given.
pub struct ReadStreamer {
    inputs: Vec<PathBuf>,
    output: Option<Sender<Vec<u8>>>,
}

impl ReadStreamer {
    pub fn new(inputs: Vec<PathBuf>, output: Sender<Vec<u8>>) -> Self {
        ReadStreamer {
            inputs,
            output: Some(output),
        }
    }
}

impl Process for ReadStreamer {
    fn run(&mut self) -> Result<()> {
        let output = self.output.take().context("read streamer not connected")?;
        log::info!("now streaming reads...");

        let mut count: u64 = 0;
        let mut length_total: u64 = 0;
        let mut readers = Vec::new();
        if self.inputs.is_empty() {
            readers.push(needletail::parse_fastx_stdin().context("reading from stdin")?);
        } else {
            for path in &self.inputs {
                readers.push(
                    needletail::parse_fastx_file(path)
                        .context(format!("opening read file {:?}", path))?,
                );
            }
        }
        for reader in readers.iter_mut() {
            while let Some(record) = reader.next() {
                let record = record.context("reading sequence record")?;
                let sequence = record.seq().into_owned();
                count += 1;
                length_total += sequence.len() as u64;
                if output.send(sequence).is_err() {
                    return Ok(());
                }
            }
        }
        if count == 0 {
            bail!("no sequence reads received from input");
        }
        log::info!("\tnumber of reads received from input: {}", count);
        log::info!(
            "\tmean read length: {:.0}",
            length_total as f64 / count as f64
        );
        Ok(())
    }
}

/// One forest hit bound for a graph augmenter.
struct Augment {
    sub_path: SubPath,
    offset: usize,
    window: usize,
}

/// Sketches reads, queries the forest and projects the hits onto the graphs.
///
/// A pool of worker threads shares the read queue; every graph gets its own
/// augmenter thread fed through a fan-in channel, so all increments for one
/// graph are serialised without per-node locks.
pub struct ReadMapper {
    kmer_size: usize,
    sketch_size: usize,
    kmv: bool,
    window_size: usize,
    processors: usize,
    bloom: Option<BloomFilter>,
    forest: LshForest,
    store: GraphStore,
    input: Receiver<Vec<u8>>,
    output: Option<Sender<crate::graph::Graph>>,
}

impl ReadMapper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kmer_size: usize,
        sketch_size: usize,
        kmv: bool,
        window_size: usize,
        processors: usize,
        use_bloom: bool,
        forest: LshForest,
        store: GraphStore,
        input: Receiver<Vec<u8>>,
        output: Sender<crate::graph::Graph>,
    ) -> Self {
        ReadMapper {
            kmer_size,
            sketch_size,
            kmv,
            window_size,
            processors: processors.max(1),
            bloom: use_bloom.then(BloomFilter::new),
            forest,
            store,
            input,
            output: Some(output),
        }
    }
}

impl Process for ReadMapper {
    fn run(&mut self) -> Result<()> {
        let output = self.output.take().context("read mapper not connected")?;
        let (kmer_size, sketch_size, kmv, window_size) =
            (self.kmer_size, self.sketch_size, self.kmv, self.window_size);
        let forest = &self.forest;
        let bloom = self.bloom.as_ref();

        let mut totals = MapCounters::default();
        std::thread::scope(|scope| -> Result<()> {
            // one augmenter per graph; it exclusively owns the graph while
            // mapping runs, so increments need no locks
            let mut augment_senders: FxHashMap<usize, Sender<Augment>> = FxHashMap::default();
            let mut augmenters = Vec::new();
            for (graph_id, graph) in self.store.iter_mut() {
                let (tx, rx) = bounded::<Augment>(BUFFER_SIZE);
                augment_senders.insert(*graph_id, tx);
                augmenters.push(scope.spawn(move || -> Result<()> {
                    for job in rx.iter() {
                        graph.increment_sub_path(&job.sub_path, job.offset, job.window, kmer_size)?;
                    }
                    Ok(())
                }));
            }

            let mut workers = Vec::new();
            for _ in 0..self.processors {
                let reads = self.input.clone();
                let senders = augment_senders.clone();
                workers.push(scope.spawn(move || -> Result<MapCounters> {
                    let mut counters = MapCounters::default();
                    for read in reads.iter() {
                        counters.received += 1;
                        let mut hits = 0u64;
                        for shred in shred_read(&read, window_size, kmer_size) {
                            let sketch =
                                match sketch_sequence(shred, kmer_size, sketch_size, kmv, bloom) {
                                    Ok(sketch) => sketch,
                                    Err(ArgotError::SequenceTooShort { .. }) => {
                                        counters.too_short += 1;
                                        continue;
                                    }
                                    Err(e) => return Err(e.into()),
                                };
                            for hit in forest.query(&sketch)? {
                                // an unknown key means the index is corrupt
                                let key = forest.get_key(&hit)?;
                                hits += 1;
                                if let Some(tx) = senders.get(&key.graph_id) {
                                    let job = Augment {
                                        sub_path: key.sub_path.clone(),
                                        offset: key.offset,
                                        window: shred.len(),
                                    };
                                    // a send failure surfaces as the
                                    // augmenter's own error on join
                                    let _ = tx.send(job);
                                }
                            }
                        }
                        if hits > 0 {
                            counters.mapped += 1;
                        }
                        if hits > 1 {
                            counters.multimapped += 1;
                        }
                    }
                    Ok(counters)
                }));
            }

            let mut first_error: Option<anyhow::Error> = None;
            for worker in workers {
                match worker.join() {
                    Ok(Ok(counters)) => totals += counters,
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(anyhow!("mapping worker panicked"));
                    }
                }
            }
            // all workers are done; closing the fan-in channels lets the
            // augmenters drain and exit
            drop(augment_senders);
            for augmenter in augmenters {
                match augmenter.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(anyhow!("graph augmenter panicked"));
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            Ok(())
        })?;

        log::info!("\tnumber of reads sketched: {}", totals.received);
        if totals.too_short > 0 {
            log::info!("\treads dropped as shorter than k: {}", totals.too_short);
        }
        if totals.mapped == 0 {
            log::warn!("no reads could be mapped to the reference graphs");
        } else {
            log::info!("\ttotal number of mapped reads: {}", totals.mapped);
            log::info!("\t\tuniquely mapped: {}", totals.mapped - totals.multimapped);
            log::info!("\t\tmultimapped: {}", totals.multimapped);
        }
        let total_kmers: f64 = self.store.values().map(|g| g.kmer_total).sum();
        log::info!("\tnumber of k-mers projected onto graphs: {:.0}", total_kmers);

        // mapping is finished, pass the weighted graphs on
        for (_, graph) in self.store.drain() {
            if output.send(graph).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Tile a long read into overlapping window-sized shreds.
///
/// Reads no longer than `window_size + k` map as a single piece. Longer reads
/// are cut with stride `window_size - k + 1` (consecutive shreds overlap by
/// `k - 1`, so no k-mer is lost at a seam) and a right-aligned final shred.
fn shred_read(read: &[u8], window_size: usize, k: usize) -> Vec<&[u8]> {
    if read.len() <= window_size + k {
        return vec![read];
    }
    let stride = window_size - k + 1;
    let mut shreds = Vec::new();
    let mut start = 0;
    while start + window_size < read.len() {
        shreds.push(&read[start..start + window_size]);
        start += stride;
    }
    shreds.push(&read[read.len() - window_size..]);
    shreds
}

/// Prunes weighted graphs and writes the survivors out as GFA.
pub struct GraphPruner {
    min_kmer_coverage: f64,
    min_base_coverage: f64,
    graph_dir: PathBuf,
    input: Receiver<crate::graph::Graph>,
}

impl GraphPruner {
    pub fn new(
        min_kmer_coverage: f64,
        min_base_coverage: f64,
        graph_dir: PathBuf,
        input: Receiver<crate::graph::Graph>,
    ) -> Self {
        GraphPruner {
            min_kmer_coverage,
            min_base_coverage,
            graph_dir,
            input,
        }
    }
}

impl Process for GraphPruner {
    fn run(&mut self) -> Result<()> {
        log::info!("processing graphs...");
        let mut counters = PruneCounters::default();
        for mut graph in self.input.iter() {
            counters.received += 1;
            if !graph.prune(self.min_kmer_coverage, self.min_base_coverage) {
                counters.discarded += 1;
                continue;
            }
            let file = self
                .graph_dir
                .join(format!("argot-graph-{}.gfa", graph.graph_id));
            if !graph.save_gfa(&file)? {
                // nothing mapped to this graph
                counters.discarded += 1;
                continue;
            }
            counters.written += 1;
            let survivors = graph.surviving_path_ids();
            log::info!(
                "\tgraph {} has {} remaining paths after weighting and pruning",
                graph.graph_id,
                survivors.len()
            );
            for path_id in survivors {
                counters.surviving_paths += 1;
                log::info!(
                    "\t- [{}]",
                    String::from_utf8_lossy(&graph.paths[&path_id])
                );
            }
        }
        log::info!("\ttotal number of graphs pruned: {}", counters.received);
        if counters.written == 0 {
            log::warn!("\tno graphs remaining after pruning");
        } else {
            log::info!("writing graphs to {:?}...", self.graph_dir);
            log::info!("\ttotal number of graphs written to disk: {}", counters.written);
            log::info!(
                "\ttotal number of possible haplotypes found: {}",
                counters.surviving_paths
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reads_are_a_single_shred() {
        let read = vec![b'A'; 100];
        assert_eq!(shred_read(&read, 100, 7), vec![&read[..]]);
        let read = vec![b'A'; 107];
        assert_eq!(shred_read(&read, 100, 7).len(), 1);
    }

    #[test]
    fn long_reads_tile_with_overlap() {
        let read: Vec<u8> = (0..250).map(|i| b"ACGT"[i % 4]).collect();
        let shreds = shred_read(&read, 100, 7);
        assert!(shreds.len() > 1);
        assert!(shreds.iter().all(|s| s.len() == 100));
        // first shred starts at the read start, last ends at the read end
        assert_eq!(shreds[0], &read[0..100]);
        assert_eq!(*shreds.last().unwrap(), &read[150..250]);
        // consecutive shreds overlap by k - 1
        assert_eq!(&shreds[0][94..], &shreds[1][..6]);
    }
}
