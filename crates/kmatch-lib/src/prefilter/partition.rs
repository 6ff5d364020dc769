//! Domain decomposition across worker threads
//!
//! Splits the sequence id range into contiguous per-thread ranges balanced
//! by cumulative residue count rather than sequence count — extraction
//! cost is residue-proportional, and sequence lengths can be wildly
//! skewed. The decomposition is deterministic for a given store and
//! thread count.

use std::ops::Range;

use crate::sequence_store::SequenceStore;

/// Partition `[0, count)` into at most `parts` contiguous ranges with
/// balanced total residue counts. Empty ranges are not returned, so the
/// result may be shorter than `parts`.
pub fn residue_balanced_ranges(store: &dyn SequenceStore, parts: usize) -> Vec<Range<u32>> {
    let count = store.count();
    let total = store.total_residues();
    let parts = parts.max(1);
    if count == 0 {
        return Vec::new();
    }

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0u32;
    let mut accumulated = 0usize;
    let mut boundary = 1usize; // next cumulative target is boundary * total / parts

    for id in 0..count {
        accumulated += store.length(id);
        // Close the current range once it reaches its share. Integer
        // cross-multiplication keeps the cut points exact.
        while boundary < parts && accumulated * parts >= boundary * total {
            boundary += 1;
            if id + 1 > start {
                ranges.push(start..id + 1);
                start = id + 1;
            }
        }
    }
    if start < count {
        ranges.push(start..count);
    }

    ranges
}
