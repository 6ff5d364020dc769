//! Constants shared across the prefilter engine
//!
//! Sentinel values, parameter defaults and the fixed per-symbol lookup
//! table of the sampling hash live here so every component agrees on them.

/// Sentinel k-mer code: marks unfilled arena slots and dropped records.
pub const SENTINEL_CODE: u64 = u64::MAX;

/// Sentinel sequence id terminating a group inside a spill file.
pub const SPILL_GROUP_END: u32 = u32::MAX;

/// Default number of sampled k-mers kept per sequence.
pub const DEFAULT_TOP_KMERS: usize = 20;

/// Default coverage threshold for candidate pairs.
pub const DEFAULT_COVERAGE: f32 = 0.8;

/// Default reduced alphabet size (group count including the unknown code).
pub const DEFAULT_ALPHABET_SIZE: usize = 13;

/// Default rotate amount of the sampling hash.
pub const DEFAULT_HASH_SHIFT: u32 = 5;

/// Default RAM limit in GiB for the record arena (0 = unlimited).
pub const DEFAULT_RAM_LIMIT_GIB: usize = 8;

/// Bytes per GiB.
pub const GIB: usize = 1024 * 1024 * 1024;

/// Fraction of the configured memory budget the planner may actually use.
pub const BUDGET_UTILIZATION: f64 = 0.9;

/// Per-split arena headroom for hash-based split imbalance.
pub const SPLIT_IMBALANCE_MARGIN: f64 = 1.2;

/// Highest window start position a record can address (positions are `i16`).
pub const MAX_KMER_POSITION: usize = i16::MAX as usize;

/// Fixed pseudo-random per-symbol table of the sampling hash.
///
/// One entry per residue code of the widest supported alphabet. The table
/// is part of the sampler's observable behavior and must not change
/// between runs.
pub const HASH_LOOKUP: [u16; 21] = [
    0x4567, 0x23c6, 0x9869, 0x4873, 0xdc51, 0x5cff, 0x944a, 0x58ec, 0x1f29,
    0x7ccd, 0x58ba, 0xd7ab, 0x41f2, 0x1efb, 0xa9e3, 0xe146, 0x007c, 0x62c2,
    0x0854, 0x27f8, 0x231b,
];

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table_covers_widest_alphabet() {
        assert_eq!(HASH_LOOKUP.len(), 21);

        // No duplicate entries; every symbol must contribute distinctly.
        let mut sorted = HASH_LOOKUP.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), HASH_LOOKUP.len());
    }

    #[test]
    fn test_sentinels_are_extremes() {
        assert_eq!(SENTINEL_CODE, u64::MAX);
        assert_eq!(SPILL_GROUP_END, u32::MAX);
        assert!(MAX_KMER_POSITION <= i16::MAX as usize);
    }
}
