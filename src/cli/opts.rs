use clap::{ArgAction, Args};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct IndexOpts {
    /// Directory containing the clustered reference MSAs (one aligned FASTA
    /// per cluster, named *.msa) [path]
    #[clap(short = 'm', long, required = true, help_heading = "Core")]
    pub msa_dir: PathBuf,

    /// K-mer size used for sketching [integer]
    #[clap(short = 'k', long, default_value = "21", help_heading = "Sketching")]
    pub kmer_size: usize,

    /// MinHash sketch size [integer]
    #[clap(short = 's', long, default_value = "42", help_heading = "Sketching")]
    pub sketch_size: usize,

    /// Size of the window to sketch graph traversals with [integer]
    ///
    /// Choose roughly the expected read length.
    #[clap(short = 'w', long, default_value = "100", help_heading = "Sketching")]
    pub window_size: usize,

    /// Minimum Jaccard similarity for a sketch hit to be recorded [float]
    #[clap(short = 'j', long, default_value = "0.99", help_heading = "Sketching")]
    pub jaccard_threshold: f64,

    /// Use the KMV MinHash algorithm instead of bottom-k [flag]
    #[clap(long, help_heading = "Sketching")]
    pub kmv: bool,
}

#[derive(Debug, Args)]
pub struct SketchOpts {
    /// FASTQ/FASTA file(s) to map (gzip accepted); reads stdin when omitted [path]
    #[clap(short = 'f', long, num_args = 1.., action = ArgAction::Append, help_heading = "Core")]
    pub fastq: Vec<PathBuf>,

    /// Directory to save the weighted variation graphs to [path]
    #[clap(short = 'g', long, default_value = "./argot-graphs", help_heading = "Core")]
    pub graph_dir: PathBuf,

    /// Use a bloom filter to keep singleton k-mers out of read sketches [flag]
    #[clap(long, help_heading = "Filtering")]
    pub bloom_filter: bool,

    /// Minimum k-mer coverage per segment base [float]
    #[clap(short = 'c', long, default_value = "1.0", help_heading = "Filtering")]
    pub min_kmer_coverage: f64,

    /// Minimum proportion of segment bases covered by mapped windows [float]
    #[clap(long, default_value = "0.1", help_heading = "Filtering")]
    pub min_base_coverage: f64,
}

#[derive(Debug, Args)]
pub struct HaplotypeOpts {
    /// Directory holding the weighted GFA graphs from `argot sketch` [path]
    #[clap(short = 'g', long, default_value = "./argot-graphs", help_heading = "Core")]
    pub graph_dir: PathBuf,

    /// Output directory for the called haplotypes [path]
    #[clap(short = 'o', long, default_value = "./argot-haplotypes", help_heading = "Core")]
    pub haplotype_dir: PathBuf,

    /// Minimum relative abundance for a path to be called [float]
    #[clap(long, default_value = "0.05", help_heading = "EM")]
    pub cutoff: f64,

    /// Minimum number of EM iterations before convergence may stop [integer]
    #[clap(long, default_value = "50", help_heading = "EM")]
    pub min_iterations: usize,

    /// Maximum number of EM iterations [integer]
    #[clap(long, default_value = "10000", help_heading = "EM")]
    pub max_iterations: usize,
}
