use anyhow::{bail, Context, Result};
use argot::cli::io::collect_files;
use argot::cli::opts::{HaplotypeOpts, IndexOpts, SketchOpts};
use argot::graph::em::EmOptions;
use argot::index::store::{load_index, load_info, save_index, GraphStore, IndexInfo};
use argot::index::LshForest;
use argot::pipeline::haplotype::{EmRunner, GfaReader, HaplotypeWriter};
use argot::pipeline::index::{GraphSketcher, MsaConverter, SketchIndexer};
use argot::pipeline::sketch::{GraphPruner, ReadMapper, ReadStreamer};
use argot::pipeline::{Pipeline, BUFFER_SIZE};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use std::fs::create_dir_all;
use std::time::Instant;

/// Command-line interface for the argot resistance-gene typer
#[derive(Parser)]
#[command(
    name = "argot",
    about = "Type antibiotic resistance genes in metagenomic samples using sketched variation graphs",
    long_about = "Type antibiotic resistance genes in metagenomic samples.

WORKFLOW:
    $ argot index -m <path/to/msa_dir/> -i <path/to/index_dir/>
    $ argot sketch -f <reads.fastq.gz> -i <path/to/index_dir/> -g <path/to/graph_dir/>
    $ argot haplotype -g <path/to/graph_dir/> -o <path/to/haplotype_dir/> -i <path/to/index_dir/>
    ",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the index files [path]
    #[arg(short = 'i', long, global = true, default_value = "./argot-index")]
    index_dir: std::path::PathBuf,

    /// Number of threads to use; 0 means all available [integer]
    #[arg(short = 't', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert clustered reference MSAs to variation graphs and index them
    Index(IndexOpts),
    /// Sketch reads, map them against the index and weight the graphs
    Sketch(SketchOpts),
    /// Call haplotypes from the weighted graphs via expectation-maximisation
    Haplotype(HaplotypeOpts),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    if let Err(e) = run() {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // size the global thread pool once; stages and rayon loops share it
    let threads = if cli.threads == 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        cli.threads
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("building the thread pool")?;

    log::info!("this is argot (version {})", argot::VERSION);
    match &cli.command {
        Commands::Index(opts) => run_index(&cli, opts, threads),
        Commands::Sketch(opts) => run_sketch(&cli, opts, threads),
        Commands::Haplotype(opts) => run_haplotype(&cli, opts),
    }
}

/* ---------- index subcommand ---------------------------------------- */

fn run_index(cli: &Cli, opts: &IndexOpts, threads: usize) -> Result<()> {
    let start_time = Instant::now();
    log::info!("starting the index subcommand");

    log::info!("checking parameters...");
    check_index_opts(opts)?;
    let msa_files = collect_files(&opts.msa_dir, "msa")?;
    log::info!("\tdirectory containing MSA files: {:?}", opts.msa_dir);
    log::info!("\tnumber of MSA files: {}", msa_files.len());
    log::info!("\tprocessors: {}", threads);
    log::info!("\tk-mer size: {}", opts.kmer_size);
    log::info!("\tsketch size: {}", opts.sketch_size);
    if opts.kmv {
        log::info!("\tMinHash algorithm: K-Minimum Values");
    } else {
        log::info!("\tMinHash algorithm: bottom-k");
    }
    log::info!("\tgraph window size: {}", opts.window_size);
    log::info!("\tminimum Jaccard similarity: {:.2}", opts.jaccard_threshold);
    create_dir_all(&cli.index_dir).context("cannot create the index directory")?;

    // wire the indexing pipeline
    log::info!("initialising indexing pipeline...");
    let (graph_tx, graph_rx) = bounded(BUFFER_SIZE);
    let (window_tx, window_rx) = bounded(BUFFER_SIZE);
    let (store_tx, store_rx) = bounded::<GraphStore>(1);
    let (forest_tx, forest_rx) = bounded::<LshForest>(1);

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(MsaConverter::new(msa_files, graph_tx)));
    pipeline.add(Box::new(GraphSketcher::new(
        opts.window_size,
        opts.kmer_size,
        opts.sketch_size,
        opts.kmv,
        graph_rx,
        window_tx,
        store_tx,
    )));
    pipeline.add(Box::new(SketchIndexer::new(
        opts.sketch_size,
        opts.jaccard_threshold,
        window_rx,
        forest_tx,
    )));
    log::info!("\tnumber of processes added to the indexing pipeline: {}", pipeline.len());
    log::info!("creating graphs, sketching traversals and indexing...");
    pipeline.run()?;

    let store = store_rx.recv().context("indexing produced no graph store")?;
    let forest = forest_rx.recv().context("indexing produced no LSH forest")?;
    let info = IndexInfo::new(
        opts.kmer_size,
        opts.sketch_size,
        opts.kmv,
        opts.jaccard_threshold,
        opts.window_size,
    );
    log::info!("writing index files to {:?}...", cli.index_dir);
    save_index(&cli.index_dir, &info, &store, &forest)?;
    log::info!("finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn check_index_opts(opts: &IndexOpts) -> Result<()> {
    if opts.kmer_size == 0 || opts.sketch_size == 0 || opts.window_size == 0 {
        bail!("k-mer size, sketch size and window size must all be positive");
    }
    if opts.kmer_size > opts.window_size {
        bail!(
            "supplied k-mer size ({}) is greater than the window size ({})",
            opts.kmer_size,
            opts.window_size
        );
    }
    if opts.jaccard_threshold <= 0.0 || opts.jaccard_threshold >= 1.0 {
        bail!("Jaccard similarity threshold must lie in (0, 1)");
    }
    // bottom-k sketches can only fill up to one hash per k-mer in a window
    let kmers_per_window = opts.window_size - opts.kmer_size + 1;
    if !opts.kmv && opts.sketch_size > kmers_per_window {
        bail!(
            "bottom-k sketch size ({}) exceeds the {} k-mers available per window; reduce -s or use --kmv",
            opts.sketch_size,
            kmers_per_window
        );
    }
    Ok(())
}

/* ---------- sketch subcommand --------------------------------------- */

fn run_sketch(cli: &Cli, opts: &SketchOpts, threads: usize) -> Result<()> {
    let start_time = Instant::now();
    log::info!("starting the sketch subcommand");

    log::info!("checking parameters...");
    if opts.min_kmer_coverage < 0.0 {
        bail!("minimum k-mer coverage must be non-negative");
    }
    if !(0.0..=1.0).contains(&opts.min_base_coverage) {
        bail!("minimum base coverage must lie in [0, 1]");
    }
    log::info!("\tprocessors: {}", threads);
    log::info!("\tignoring unique k-mers: {}", opts.bloom_filter);
    log::info!("\tminimum k-mer coverage: {:.2}", opts.min_kmer_coverage);
    log::info!("\tminimum base coverage: {:.2}", opts.min_base_coverage);
    for file in &opts.fastq {
        log::info!("\tinput file: {:?}", file);
    }

    log::info!("loading the index from {:?}...", cli.index_dir);
    let (info, store, forest) = load_index(&cli.index_dir)?;
    log::info!("\tk-mer size: {}", info.kmer_size);
    log::info!("\tsketch size: {}", info.sketch_size);
    log::info!("\tJaccard similarity threshold: {:.2}", info.jaccard_threshold);
    log::info!("\twindow size used in indexing: {}", info.window_size);
    log::info!("\tnumber of variation graphs: {}", store.len());
    let (k, l) = forest.settings();
    log::info!("\tnumber of LSH forest buckets: {}", l);
    log::info!("\tnumber of hash functions per bucket: {}", k);
    create_dir_all(&opts.graph_dir).context("cannot create the graph directory")?;

    // wire the sketching pipeline
    log::info!("initialising sketching pipeline...");
    let (read_tx, read_rx) = bounded(BUFFER_SIZE);
    let (graph_tx, graph_rx) = bounded(BUFFER_SIZE);

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(ReadStreamer::new(opts.fastq.clone(), read_tx)));
    pipeline.add(Box::new(ReadMapper::new(
        info.kmer_size,
        info.sketch_size,
        info.kmv_sketch,
        info.window_size,
        threads,
        opts.bloom_filter,
        forest,
        store,
        read_rx,
        graph_tx,
    )));
    pipeline.add(Box::new(GraphPruner::new(
        opts.min_kmer_coverage,
        opts.min_base_coverage,
        opts.graph_dir.clone(),
        graph_rx,
    )));
    log::info!("\tnumber of processes added to the sketching pipeline: {}", pipeline.len());
    log::info!("sketching reads and mapping against the graphs...");
    pipeline.run()?;
    log::info!("finished in {:.2?}", start_time.elapsed());
    Ok(())
}

/* ---------- haplotype subcommand ------------------------------------ */

fn run_haplotype(cli: &Cli, opts: &HaplotypeOpts) -> Result<()> {
    let start_time = Instant::now();
    log::info!("starting the haplotype subcommand");

    log::info!("checking parameters...");
    if opts.min_iterations > opts.max_iterations {
        bail!("minimum EM iterations cannot exceed the maximum");
    }
    if opts.max_iterations == 0 {
        bail!("maximum EM iterations must be positive");
    }
    if !(0.0..=1.0).contains(&opts.cutoff) {
        bail!("abundance cutoff must lie in [0, 1]");
    }

    // the index itself is not needed for EM, but its presence and version
    // are still checked so stale results cannot be mixed
    let info = load_info(&cli.index_dir)?;
    log::info!("\tindex version: {}", info.version);
    log::info!("\tEM iterations: {} to {}", opts.min_iterations, opts.max_iterations);
    log::info!("\tabundance cutoff: {:.2}", opts.cutoff);

    let gfa_files = collect_files(&opts.graph_dir, "gfa")?;
    log::info!("\tnumber of weighted graphs: {}", gfa_files.len());
    create_dir_all(&opts.haplotype_dir).context("cannot create the haplotype directory")?;

    // wire the haplotype pipeline
    log::info!("initialising haplotype pipeline...");
    let (graph_tx, graph_rx) = bounded(BUFFER_SIZE);
    let (em_tx, em_rx) = bounded(BUFFER_SIZE);

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(GfaReader::new(gfa_files, graph_tx)));
    pipeline.add(Box::new(EmRunner::new(
        EmOptions {
            min_iterations: opts.min_iterations,
            max_iterations: opts.max_iterations,
            abundance_cutoff: opts.cutoff,
        },
        graph_rx,
        em_tx,
    )));
    pipeline.add(Box::new(HaplotypeWriter::new(opts.haplotype_dir.clone(), em_rx)));
    log::info!("\tnumber of processes added to the haplotype pipeline: {}", pipeline.len());
    log::info!("resolving haplotypes...");
    pipeline.run()?;
    log::info!("finished in {:.2?}", start_time.elapsed());
    Ok(())
}
