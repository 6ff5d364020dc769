// kmatch: linear-time k-mer candidate generation for sequence clustering
//
// Given a collection of sequences, produces for every sequence a compact
// approximate list of likely homologs by sampled k-mer sharing — without
// pairwise alignment. The hit lists feed a downstream aligner.

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod alphabet;
pub mod constants;
pub mod error;
pub mod hasher;
pub mod hit_store;
pub mod kmer;
pub mod masking;
pub mod prefilter;
pub mod sequence_store;

// Re-export common types at crate root
pub use alphabet::Alphabet;
pub use error::KmatchError;
pub use hasher::RollingHasher;
pub use hit_store::{FlatFileHitStore, Hit, HitWriter, MemoryHitStore};
pub use kmer::KmerCoder;
pub use prefilter::{Prefilter, PrefilterConfig, PrefilterSummary};
pub use sequence_store::{InMemorySequenceStore, SequenceStore};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
