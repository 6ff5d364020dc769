//! Prefilter configuration
//!
//! One immutable struct threaded through every component constructor.
//! `kmer_length == 0` selects the k-mer length and alphabet automatically
//! from the target sequence identity, mirroring the linear-filter
//! defaults.

use std::path::PathBuf;

use crate::alphabet::{FULL_ALPHABET_SIZE, MIN_ALPHABET_SIZE};
use crate::constants::{
    DEFAULT_ALPHABET_SIZE, DEFAULT_COVERAGE, DEFAULT_HASH_SHIFT, DEFAULT_RAM_LIMIT_GIB,
    DEFAULT_TOP_KMERS,
};
use crate::error::KmatchError;

/// Configuration parameters for a prefilter run
#[derive(Debug, Clone)]
pub struct PrefilterConfig {
    /// K-mer length (0 = choose from `seq_id_threshold`)
    pub kmer_length: usize,

    /// Reduced alphabet size, including the unknown code
    pub alphabet_size: usize,

    /// Number of sampled k-mers kept per sequence
    pub top_kmers: usize,

    /// Length-ratio coverage threshold; pairs strictly below it are dropped
    pub coverage: f32,

    /// Target sequence identity, used only to auto-select the k-mer length
    pub seq_id_threshold: f32,

    /// Number of worker threads (0 = all available cores)
    pub num_threads: usize,

    /// Masking mode: 0 = none, 1 = low-complexity, 2 = rejected up front
    pub mask_mode: u32,

    /// Rotate amount of the sampling hash
    pub hash_shift: u32,

    /// RAM limit in GiB for the record arena (0 = unlimited)
    pub ram_limit_gib: usize,

    /// Forced split count (0 = derive from the memory budget)
    pub splits: usize,

    /// Directory for spill files
    pub tmp_dirname: PathBuf,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            kmer_length: 0,
            alphabet_size: DEFAULT_ALPHABET_SIZE,
            top_kmers: DEFAULT_TOP_KMERS,
            coverage: DEFAULT_COVERAGE,
            seq_id_threshold: 0.5,
            num_threads: 0,
            mask_mode: 0,
            hash_shift: DEFAULT_HASH_SHIFT,
            ram_limit_gib: DEFAULT_RAM_LIMIT_GIB,
            splits: 0,
            tmp_dirname: PathBuf::from("kmatch_tmp"),
        }
    }
}

impl PrefilterConfig {
    /// The `(k, alphabet_size)` the run will actually use.
    ///
    /// With `kmer_length == 0`: high target identity (≥ 0.9) selects long
    /// k-mers over the 13-letter alphabet, anything lower the short
    /// variant.
    pub fn resolved_kmer_params(&self) -> (usize, usize) {
        if self.kmer_length == 0 {
            if self.seq_id_threshold + 0.001 >= 0.9 {
                (14, 13)
            } else {
                (10, 13)
            }
        } else {
            (self.kmer_length, self.alphabet_size)
        }
    }

    /// Validate the configuration, including the resolved parameters.
    ///
    /// The unsupported masking mode is rejected here, before any work
    /// starts.
    pub fn validate(&self) -> Result<(), KmatchError> {
        if self.mask_mode >= 2 {
            return Err(KmatchError::UnsupportedMaskMode(self.mask_mode));
        }

        let (k, alphabet_size) = self.resolved_kmer_params();
        if !(MIN_ALPHABET_SIZE..=FULL_ALPHABET_SIZE).contains(&alphabet_size) {
            return Err(KmatchError::InvalidConfig(format!(
                "alphabet size {alphabet_size} not in {MIN_ALPHABET_SIZE}..={FULL_ALPHABET_SIZE}"
            )));
        }
        if k < 2 {
            return Err(KmatchError::InvalidConfig(format!(
                "k-mer length {k} is too short"
            )));
        }
        let space = (alphabet_size as u128).checked_pow(k as u32);
        if space.is_none() || space.unwrap() > u64::MAX as u128 + 1 {
            return Err(KmatchError::InvalidConfig(format!(
                "k-mer code space {alphabet_size}^{k} does not fit in 64 bits"
            )));
        }

        if self.top_kmers == 0 {
            return Err(KmatchError::InvalidConfig(
                "at least one sampled k-mer per sequence is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coverage) {
            return Err(KmatchError::InvalidConfig(format!(
                "coverage threshold {} not in [0, 1]",
                self.coverage
            )));
        }
        if !(1..16).contains(&self.hash_shift) {
            return Err(KmatchError::InvalidConfig(format!(
                "hash shift {} not in 1..16",
                self.hash_shift
            )));
        }

        Ok(())
    }

    /// Log the effective parameters via tracing.
    pub fn print(&self) {
        let (k, alphabet_size) = self.resolved_kmer_params();
        tracing::info!("Prefilter configuration:");
        tracing::info!("  k = {} (alphabet size {})", k, alphabet_size);
        tracing::info!("  k-mers per sequence = {}", self.top_kmers);
        tracing::info!("  coverage threshold = {}", self.coverage);
        tracing::info!("  masking = {}", self.mask_mode);
        if self.num_threads == 0 {
            tracing::info!("  threads = all available cores");
        } else {
            tracing::info!("  threads = {}", self.num_threads);
        }
        tracing::debug!("  hash shift = {}", self.hash_shift);
        tracing::debug!("  ram limit = {} GiB", self.ram_limit_gib);
        tracing::debug!("  splits = {}", self.splits);
        tracing::debug!("  tmp dir = {:?}", self.tmp_dirname);
    }
}
