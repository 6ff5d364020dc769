//! Sort passes and cluster assignment
//!
//! Two explicit total-order keys drive the pipeline; both are defined
//! once here and nowhere else.
//!
//! * **Group-forming key** (pass A): `(kmer_code asc, seq_len desc,
//!   seq_id asc, position asc)`. Records of one k-mer become adjacent and
//!   the longest (earliest-id) sequence sorts first — that record is the
//!   group's representative.
//! * **Cluster-emission key** (pass B, after assignment): `(representative
//!   asc, member asc, |diagonal| asc, diagonal asc)`. One contiguous run
//!   per representative, members in id order, and the smallest diagonal
//!   magnitude first so deduplication keeps it. The trailing signed
//!   diagonal makes the key a total order.
//!
//! Assignment is a single linear scan over pass-A order: each group
//! elects its first record as representative, a group of one is dropped
//! (a k-mer unique to one sequence pairs nothing), and every surviving
//! record is rewritten in place — `kmer_code` becomes the representative
//! id and `position` the signed diagonal `rep_pos - member_pos`.

use std::cmp::Reverse;

use rayon::prelude::*;

use crate::constants::SENTINEL_CODE;

use super::extraction::KmerRecord;

#[inline]
fn group_key(r: &KmerRecord) -> (u64, Reverse<u16>, u32, i16) {
    (r.kmer_code, Reverse(r.seq_len), r.seq_id, r.position)
}

#[inline]
fn emission_key(r: &KmerRecord) -> (u64, u32, u16, i16) {
    (r.kmer_code, r.seq_id, r.position.unsigned_abs(), r.position)
}

/// Pass A: sort by the group-forming key.
pub fn sort_group_order(records: &mut [KmerRecord]) {
    records.par_sort_unstable_by_key(group_key);
}

/// Pass B: sort by the cluster-emission key. Dropped records (sentinel
/// code) sort to the end.
pub fn sort_emission_order(records: &mut [KmerRecord]) {
    records.par_sort_unstable_by_key(emission_key);
}

/// Rewrite pass-A-sorted records group by group.
///
/// Returns the number of records surviving (i.e. not rewritten to the
/// sentinel code).
pub fn assign_representatives(records: &mut [KmerRecord]) -> usize {
    let n = records.len();
    let mut surviving = 0;
    let mut start = 0;
    for idx in 0..=n {
        if idx < n && records[idx].kmer_code == records[start].kmer_code {
            continue;
        }
        // Close the group [start, idx).
        if idx - start == 1 {
            records[start] = KmerRecord {
                kmer_code: SENTINEL_CODE,
                ..records[start]
            };
        } else if idx > start {
            let rep_id = records[start].seq_id;
            let rep_pos = records[start].position;
            for record in &mut records[start..idx] {
                record.kmer_code = rep_id as u64;
                record.position = rep_pos - record.position;
            }
            surviving += idx - start;
        }
        start = idx;
    }
    surviving
}
