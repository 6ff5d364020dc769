use anyhow::Context;
use clap::Parser;
use kmatch_lib::prefilter::parse::read_sequence_store;
use kmatch_lib::{FlatFileHitStore, Prefilter, PrefilterConfig, SequenceStore};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "kmatch")]
#[command(version = "0.1.0")]
#[command(about = "Linear-time k-mer candidate generation for sequence clustering", long_about = None)]
struct Cli {
    /// Input sequence file (FASTA/FASTQ, optionally gzipped)
    input: PathBuf,

    /// Output prefilter database (a .index sidecar is written next to it)
    output: PathBuf,

    /// K-mer length (0 = choose from --min-seq-id)
    #[arg(short, long, default_value_t = 0)]
    k: usize,

    /// Reduced alphabet size, including the unknown residue
    #[arg(long, default_value_t = 13)]
    alphabet_size: usize,

    /// Sampled k-mers kept per sequence
    #[arg(long, default_value_t = 20)]
    kmers_per_sequence: usize,

    /// Length-ratio coverage threshold; pairs strictly below are dropped
    #[arg(short = 'c', long, default_value_t = 0.8)]
    cov: f32,

    /// Target sequence identity, used to auto-select the k-mer length
    #[arg(long, default_value_t = 0.5)]
    min_seq_id: f32,

    /// Number of threads (0 = all available cores)
    #[arg(short = 't', long, default_value_t = 0)]
    threads: usize,

    /// Masking mode: 0 = none, 1 = low-complexity
    #[arg(long, default_value_t = 0)]
    mask: u32,

    /// Rotate amount of the sampling hash
    #[arg(long, default_value_t = 5)]
    hash_shift: u32,

    /// RAM limit in GiB for the k-mer arena (0 = unlimited)
    #[arg(short = 'r', long, default_value_t = 8)]
    ram_limit: usize,

    /// Force a split count (0 = derive from the RAM limit)
    #[arg(long, default_value_t = 0)]
    splits: usize,

    /// Directory for spill files
    #[arg(long, default_value = "kmatch_tmp")]
    tmp_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = PrefilterConfig {
        kmer_length: cli.k,
        alphabet_size: cli.alphabet_size,
        top_kmers: cli.kmers_per_sequence,
        coverage: cli.cov,
        seq_id_threshold: cli.min_seq_id,
        num_threads: cli.threads,
        mask_mode: cli.mask,
        hash_shift: cli.hash_shift,
        ram_limit_gib: cli.ram_limit,
        splits: cli.splits,
        tmp_dirname: cli.tmp_dir,
    };

    // Validation happens here, before any input is read.
    let prefilter = Prefilter::new(config).context("invalid prefilter configuration")?;

    info!("Reading sequences from {}...", cli.input.display());
    let store = read_sequence_store(&cli.input, prefilter.alphabet())
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    info!("  {} sequences loaded", store.count());

    let mut writer = FlatFileHitStore::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;

    let summary = prefilter
        .run(&store, &mut writer)
        .context("prefilter run failed")?;

    info!(
        "Done: {} sequences -> {} clusters, {} members, {} singletons ({} split(s))",
        summary.sequences, summary.clusters, summary.members, summary.singletons, summary.splits
    );

    Ok(())
}
