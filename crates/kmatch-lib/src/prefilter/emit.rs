//! Result emission
//!
//! Walks the final grouped candidate stream once and writes one record
//! per representative: a header hit (self, score 0, diagonal 0) followed
//! by the surviving members in id order. Afterwards every sequence that
//! was neither a header nor folded into a cluster is emitted as a
//! singleton self-entry, so each input sequence appears in the output
//! exactly once — as a cluster header or as a member of exactly one
//! cluster, never both, never neither.
//!
//! Within a cluster the stream is ordered by member id with the smallest
//! diagonal magnitude first, so keeping the first occurrence of a target
//! deduplicates multi-k-mer evidence. The coverage filter drops a pair
//! whose length ratio is strictly below the threshold; equality keeps it.

use tracing::info;

use crate::error::KmatchError;
use crate::hit_store::{Hit, HitWriter};
use crate::sequence_store::SequenceStore;

/// One candidate pair in the merged, grouped stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateHit {
    /// Representative sequence id (cluster head)
    pub rep_id: u32,
    /// Member sequence id
    pub member_id: u32,
    /// Signed diagonal offset of the shared k-mer evidence
    pub diagonal: i16,
}

/// Counters of one emission pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitSummary {
    /// Clusters written with at least one member
    pub clusters: usize,
    /// Member hits written
    pub members: usize,
    /// Candidates removed as duplicate evidence for the same pair
    pub deduplicated: usize,
    /// Candidates dropped by the coverage filter
    pub dropped_by_coverage: usize,
    /// Singleton self-entries written
    pub singletons: usize,
}

/// Emit all output records for a grouped candidate stream.
///
/// `candidates` must be ordered by the cluster-emission key (pass B) and
/// contain one contiguous run per representative.
pub fn emit_results<W: HitWriter>(
    candidates: impl IntoIterator<Item = CandidateHit>,
    store: &dyn SequenceStore,
    coverage: f32,
    writer: &mut W,
) -> Result<EmitSummary, KmatchError> {
    let sequence_count = store.count() as usize;
    let mut covered = vec![false; sequence_count];
    let mut summary = EmitSummary::default();

    let mut current_rep: Option<u32> = None;
    let mut skip_cluster = false;
    let mut last_member: Option<u32> = None;
    // Buffered members of the open cluster: (member id, diagonal).
    let mut buffer: Vec<(u32, i16)> = Vec::new();

    for candidate in candidates {
        if current_rep != Some(candidate.rep_id) {
            if let Some(rep) = current_rep {
                flush_cluster(rep, &buffer, store, writer, &mut covered, &mut summary)?;
            }
            current_rep = Some(candidate.rep_id);
            skip_cluster = covered[candidate.rep_id as usize];
            last_member = None;
            buffer.clear();
        }

        if skip_cluster || candidate.member_id == candidate.rep_id {
            continue;
        }
        if last_member == Some(candidate.member_id) {
            summary.deduplicated += 1;
            continue;
        }
        last_member = Some(candidate.member_id);

        if covered[candidate.member_id as usize] {
            // Already folded into an earlier cluster.
            continue;
        }

        let rep_len = store.length(candidate.rep_id) as f32;
        let member_len = store.length(candidate.member_id) as f32;
        if coverage > 0.0 && rep_len.min(member_len) / rep_len.max(member_len) < coverage {
            summary.dropped_by_coverage += 1;
            continue;
        }

        covered[candidate.member_id as usize] = true;
        buffer.push((candidate.member_id, candidate.diagonal));
    }
    if let Some(rep) = current_rep {
        flush_cluster(rep, &buffer, store, writer, &mut covered, &mut summary)?;
    }

    // Every sequence not folded anywhere gets a singleton self-entry.
    for id in 0..sequence_count {
        if !covered[id] {
            let key = store.external_key(id as u32);
            writer.write_entry(key, &[Hit { target_key: key, score: 0, diagonal: 0 }])?;
            summary.singletons += 1;
        }
    }

    info!(
        "emitted {} clusters, {} members ({} duplicate, {} below coverage), {} singletons",
        summary.clusters,
        summary.members,
        summary.deduplicated,
        summary.dropped_by_coverage,
        summary.singletons
    );
    Ok(summary)
}

fn flush_cluster<W: HitWriter>(
    rep: u32,
    members: &[(u32, i16)],
    store: &dyn SequenceStore,
    writer: &mut W,
    covered: &mut [bool],
    summary: &mut EmitSummary,
) -> Result<(), KmatchError> {
    if members.is_empty() {
        // The representative heads nothing; it stays eligible for a later
        // cluster or a singleton entry.
        return Ok(());
    }

    let rep_key = store.external_key(rep);
    let mut hits = Vec::with_capacity(members.len() + 1);
    hits.push(Hit { target_key: rep_key, score: 0, diagonal: 0 });
    for &(member, diagonal) in members {
        hits.push(Hit {
            target_key: store.external_key(member),
            score: 0,
            diagonal,
        });
    }
    writer.write_entry(rep_key, &hits)?;

    covered[rep as usize] = true;
    summary.clusters += 1;
    summary.members += members.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit_store::MemoryHitStore;
    use crate::sequence_store::InMemorySequenceStore;

    fn store_with_lengths(lengths: &[usize]) -> InMemorySequenceStore {
        let mut store = InMemorySequenceStore::new();
        for (i, &len) in lengths.iter().enumerate() {
            store.push(format!("s{i}"), &vec![0u8; len]);
        }
        store
    }

    fn hit(rep_id: u32, member_id: u32, diagonal: i16) -> CandidateHit {
        CandidateHit { rep_id, member_id, diagonal }
    }

    #[test]
    fn test_cluster_with_header_and_member() {
        let store = store_with_lengths(&[50, 48]);
        let mut writer = MemoryHitStore::new();
        let summary = emit_results(
            vec![hit(0, 0, 0), hit(0, 1, 2)],
            &store,
            0.8,
            &mut writer,
        )
        .unwrap();

        assert_eq!(summary.clusters, 1);
        assert_eq!(summary.members, 1);
        assert_eq!(summary.singletons, 0);
        assert_eq!(writer.entries.len(), 1);
        let (key, hits) = &writer.entries[0];
        assert_eq!(key, "s0");
        assert_eq!(hits[0].target_key, "s0");
        assert_eq!(hits[0].diagonal, 0);
        assert_eq!(hits[1].target_key, "s1");
        assert_eq!(hits[1].diagonal, 2);
    }

    #[test]
    fn test_duplicate_evidence_deduplicated() {
        let store = store_with_lengths(&[50, 48]);
        let mut writer = MemoryHitStore::new();
        let summary = emit_results(
            vec![hit(0, 1, 2), hit(0, 1, 2), hit(0, 1, -5)],
            &store,
            0.0,
            &mut writer,
        )
        .unwrap();

        assert_eq!(summary.deduplicated, 2);
        assert_eq!(writer.entries[0].1.len(), 2); // header + one member
        assert_eq!(writer.entries[0].1[1].diagonal, 2);
    }

    #[test]
    fn test_coverage_boundary_kept_below_dropped() {
        // 40/50 = 0.8: exactly at the threshold, kept.
        let store = store_with_lengths(&[50, 40]);
        let mut writer = MemoryHitStore::new();
        let summary =
            emit_results(vec![hit(0, 1, 0)], &store, 0.8, &mut writer).unwrap();
        assert_eq!(summary.members, 1);
        assert_eq!(summary.dropped_by_coverage, 0);

        // 39/50 = 0.78: strictly below, dropped; both become singletons.
        let store = store_with_lengths(&[50, 39]);
        let mut writer = MemoryHitStore::new();
        let summary =
            emit_results(vec![hit(0, 1, 0)], &store, 0.8, &mut writer).unwrap();
        assert_eq!(summary.members, 0);
        assert_eq!(summary.dropped_by_coverage, 1);
        assert_eq!(summary.singletons, 2);
    }

    #[test]
    fn test_singletons_for_untouched_sequences() {
        let store = store_with_lengths(&[50, 48, 40]);
        let mut writer = MemoryHitStore::new();
        let summary =
            emit_results(vec![hit(0, 1, 1)], &store, 0.0, &mut writer).unwrap();

        assert_eq!(summary.singletons, 1);
        let (key, hits) = writer.entries.last().unwrap();
        assert_eq!(key, "s2");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_key, "s2");
    }

    #[test]
    fn test_member_folded_exactly_once() {
        // Sequence 2 is claimed by cluster 0 first; cluster 1 must not
        // re-emit it, and sequence 1's otherwise-empty cluster leaves it
        // a singleton.
        let store = store_with_lengths(&[50, 49, 48]);
        let mut writer = MemoryHitStore::new();
        let summary = emit_results(
            vec![hit(0, 2, 1), hit(1, 2, 3)],
            &store,
            0.0,
            &mut writer,
        )
        .unwrap();

        assert_eq!(summary.clusters, 1);
        assert_eq!(summary.members, 1);
        assert_eq!(summary.singletons, 1);

        // Exactly-once: every key appears once across all entries.
        let mut seen = Vec::new();
        for (_, hits) in &writer.entries {
            for (i, h) in hits.iter().enumerate() {
                if i > 0 || hits.len() == 1 {
                    seen.push(h.target_key.clone());
                }
            }
        }
        // Headers with members count via their header hit.
        for (key, hits) in &writer.entries {
            if hits.len() > 1 {
                seen.push(key.clone());
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_covered_rep_skips_its_cluster() {
        // Sequence 1 folds into cluster 0, then appears as a rep; its
        // cluster is skipped and its member falls through to a singleton.
        let store = store_with_lengths(&[50, 49, 48]);
        let mut writer = MemoryHitStore::new();
        let summary = emit_results(
            vec![hit(0, 1, 0), hit(1, 2, 5)],
            &store,
            0.0,
            &mut writer,
        )
        .unwrap();

        assert_eq!(summary.clusters, 1);
        assert_eq!(summary.singletons, 1);
        assert_eq!(writer.entries[0].0, "s0");
        assert_eq!(writer.entries[1].0, "s2");
    }

    #[test]
    fn test_empty_stream_all_singletons() {
        let store = store_with_lengths(&[10, 20]);
        let mut writer = MemoryHitStore::new();
        let summary =
            emit_results(std::iter::empty(), &store, 0.8, &mut writer).unwrap();
        assert_eq!(summary.singletons, 2);
        assert_eq!(writer.entries.len(), 2);
    }
}
