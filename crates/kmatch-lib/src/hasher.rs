//! Sampling hash for k-mer ranking
//!
//! A 16-bit rotate-XOR recurrence over the fixed per-symbol table in
//! [`crate::constants::HASH_LOOKUP`]. The hash is order-sensitive and used
//! only to *rank* k-mers for min-hash style sampling — never for equality,
//! which is what the exact k-mer code is for.
//!
//! Sliding the window by one position is O(1): the outgoing symbol's
//! contribution has been rotated `shift * (k - 1)` bits by the time it
//! leaves the window, so XOR-ing that rotation removes it exactly.

use crate::constants::HASH_LOOKUP;

/// Rolling hash over fixed-length windows of residue codes.
#[derive(Debug, Clone)]
pub struct RollingHasher {
    k: usize,
    shift: u32,
    /// Accumulated rotation of the leading symbol: `(shift * (k-1)) % 16`.
    undo_shift: u32,
}

impl RollingHasher {
    /// Create a hasher for windows of length `k` with the given rotate
    /// amount (must be in `1..16`).
    pub fn new(k: usize, shift: u32) -> Self {
        assert!(k >= 1, "k must be at least 1");
        assert!((1..16).contains(&shift), "shift must be in 1..16");
        Self {
            k,
            shift,
            undo_shift: (shift * (k as u32 - 1)) % 16,
        }
    }

    /// Hash a full window from scratch.
    #[inline]
    pub fn hash(&self, window: &[u8]) -> u16 {
        debug_assert_eq!(window.len(), self.k);
        let mut h = HASH_LOOKUP[window[0] as usize];
        for &c in &window[1..] {
            h = h.rotate_left(self.shift) ^ HASH_LOOKUP[c as usize];
        }
        h
    }

    /// Hash of the window slid one position right, given the previous hash,
    /// the outgoing leading symbol and the incoming trailing symbol.
    #[inline]
    pub fn next(&self, h: u16, outgoing: u8, incoming: u8) -> u16 {
        let h = h ^ HASH_LOOKUP[outgoing as usize].rotate_left(self.undo_shift);
        h.rotate_left(self.shift) ^ HASH_LOOKUP[incoming as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let hasher = RollingHasher::new(6, 5);
        let window = [1u8, 4, 2, 0, 7, 3];
        assert_eq!(hasher.hash(&window), hasher.hash(&window));
    }

    #[test]
    fn test_order_sensitive() {
        let hasher = RollingHasher::new(3, 5);
        assert_ne!(hasher.hash(&[1, 2, 3]), hasher.hash(&[3, 2, 1]));
    }

    #[test]
    fn test_incremental_equals_scratch() {
        // The sliding update must agree with the from-scratch hash for
        // every window of a sequence.
        for k in [4usize, 7, 10, 14] {
            for shift in [3u32, 5, 7] {
                let hasher = RollingHasher::new(k, shift);
                let seq: Vec<u8> = (0..60u32).map(|i| ((i * 7 + 3) % 21) as u8).collect();

                let mut h = hasher.hash(&seq[0..k]);
                for start in 1..=seq.len() - k {
                    h = hasher.next(h, seq[start - 1], seq[start + k - 1]);
                    assert_eq!(
                        h,
                        hasher.hash(&seq[start..start + k]),
                        "mismatch at start={start} k={k} shift={shift}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_single_symbol_window() {
        let hasher = RollingHasher::new(1, 5);
        assert_eq!(hasher.hash(&[4]), HASH_LOOKUP[4]);
        // With k = 1 the undo rotation is zero and sliding replaces the
        // whole window.
        assert_eq!(hasher.next(hasher.hash(&[4]), 4, 9), HASH_LOOKUP[9]);
    }
}
