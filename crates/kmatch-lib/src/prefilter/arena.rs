//! Record arena and memory planning
//!
//! The arena is one shared, write-once buffer of [`KmerRecord`]s per
//! split. Worker threads reserve contiguous slots with an atomic
//! fetch-and-add and copy their buffered batches in — no locks, no
//! per-record synchronization. Slots are prefilled with the sentinel code
//! so an unfilled tail is detectable.
//!
//! The planner sizes the arena from an a-priori upper bound on the total
//! sampled k-mer count, compares it against the configured memory budget,
//! and decides the split count. When even a single split arena cannot fit
//! the budget, the per-sequence sample count is halved and the plan is
//! recomputed; only at one sample per sequence does the planner give up.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::constants::{
    BUDGET_UTILIZATION, GIB, SENTINEL_CODE, SPLIT_IMBALANCE_MARGIN,
};
use crate::error::KmatchError;
use crate::sequence_store::SequenceStore;

use super::extraction::KmerRecord;

/// Size of one arena record in bytes.
pub const RECORD_SIZE_BYTES: usize = std::mem::size_of::<KmerRecord>();

/// Shared write-once record buffer with lock-free slot reservation.
pub struct RecordArena {
    slots: Box<[UnsafeCell<KmerRecord>]>,
    next: AtomicUsize,
}

// SAFETY: concurrent writers only touch disjoint slot ranges, handed out
// by the fetch-and-add in `push_batch`; reads happen only after the fill
// phase has joined all writers.
unsafe impl Sync for RecordArena {}

impl RecordArena {
    /// Allocate an arena of `capacity` sentinel-filled slots.
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[UnsafeCell<KmerRecord>]> = (0..capacity)
            .map(|_| UnsafeCell::new(KmerRecord::sentinel()))
            .collect();
        Self {
            slots,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of filled slots.
    pub fn filled(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Reserve a contiguous slot range and copy `batch` into it.
    pub fn push_batch(&self, batch: &[KmerRecord]) -> Result<(), KmatchError> {
        if batch.is_empty() {
            return Ok(());
        }
        let start = self.next.fetch_add(batch.len(), Ordering::AcqRel);
        let end = start + batch.len();
        if end > self.slots.len() {
            return Err(KmatchError::ArenaOverflow {
                capacity: self.slots.len(),
                attempted: end,
            });
        }
        // SAFETY: `start..end` was exclusively reserved above and the
        // bounds were just checked.
        unsafe {
            let dst = self.slots[start].get();
            std::ptr::copy_nonoverlapping(batch.as_ptr(), dst, batch.len());
        }
        Ok(())
    }

    /// Consume the arena, returning the filled records.
    pub fn into_records(self) -> Vec<KmerRecord> {
        let filled = self.filled();
        // SAFETY: UnsafeCell<T> is repr(transparent) over T, so the slice
        // layouts are identical; the arena is consumed, so no aliasing.
        let raw = Box::into_raw(self.slots) as *mut [KmerRecord];
        let mut records = unsafe { Box::from_raw(raw) }.into_vec();
        debug_assert!(records[filled..]
            .iter()
            .all(|r| r.kmer_code == SENTINEL_CODE));
        records.truncate(filled);
        records
    }
}

/// Result of memory planning for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    /// Number of hash-modulo splits (1 = everything in one pass)
    pub splits: usize,
    /// Possibly degraded samples-per-sequence
    pub top_kmers: usize,
    /// Upper bound on sampled records over all splits
    pub total_records: usize,
    /// Arena capacity per split, including the imbalance margin
    pub arena_capacity: usize,
}

/// Upper bound on the number of sampled k-mer records.
pub fn estimate_record_count(store: &dyn SequenceStore, k: usize, top_kmers: usize) -> usize {
    let mut total = 0usize;
    for id in 0..store.count() {
        let windows = store.length(id).saturating_sub(k - 1);
        total += windows.min(top_kmers);
    }
    total
}

/// Compute the memory plan for a run.
///
/// `forced_splits > 0` bypasses the budget arithmetic entirely; that knob
/// exists so the multi-pass path can be exercised on small inputs.
pub fn plan_memory(
    store: &dyn SequenceStore,
    k: usize,
    top_kmers: usize,
    ram_limit_gib: usize,
    forced_splits: usize,
) -> Result<MemoryPlan, KmatchError> {
    let budget = if ram_limit_gib == 0 {
        usize::MAX
    } else {
        (ram_limit_gib as f64 * GIB as f64 * BUDGET_UTILIZATION) as usize
    };
    plan_with_budget(store, k, top_kmers, budget, forced_splits)
}

fn plan_with_budget(
    store: &dyn SequenceStore,
    k: usize,
    top_kmers: usize,
    budget: usize,
    forced_splits: usize,
) -> Result<MemoryPlan, KmatchError> {
    let mut top_kmers = top_kmers;
    loop {
        let total_records = estimate_record_count(store, k, top_kmers);
        let required = total_records * RECORD_SIZE_BYTES;

        let splits = if forced_splits > 0 {
            forced_splits
        } else if required <= budget {
            1
        } else {
            // One extra split as a safety margin against estimate error.
            required.div_ceil(budget) + 1
        };

        let arena_capacity = if forced_splits > 0 {
            // Forced splitting exercises the multi-pass path, not the
            // memory bound; small inputs split unevenly, so keep the full
            // capacity.
            total_records
        } else if splits > 1 {
            ((total_records / splits) as f64 * SPLIT_IMBALANCE_MARGIN) as usize + 1
        } else {
            total_records
        };

        let arena_bytes = arena_capacity * RECORD_SIZE_BYTES;
        if forced_splits > 0 || arena_bytes <= budget {
            debug!(
                "memory plan: {} records, {} bytes needed, {} split(s), arena {} records",
                total_records, required, splits, arena_capacity
            );
            return Ok(MemoryPlan {
                splits,
                top_kmers,
                total_records,
                arena_capacity,
            });
        }

        if top_kmers == 1 {
            return Err(KmatchError::MemoryBudgetExceeded {
                required: arena_bytes,
                budget,
            });
        }
        top_kmers /= 2;
        warn!(
            "memory budget exceeded, shrinking k-mers per sequence to {}",
            top_kmers
        );
    }
}

/// Log the planning outcome the way operators expect to read it.
pub fn log_plan(plan: &MemoryPlan, requested_top_kmers: usize) {
    if plan.splits > 1 {
        info!("processing in {} splits", plan.splits);
    }
    if plan.top_kmers != requested_top_kmers {
        info!(
            "k-mers per sequence degraded from {} to {}",
            requested_top_kmers, plan.top_kmers
        );
    }
}
