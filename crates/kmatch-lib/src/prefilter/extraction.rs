//! K-mer extraction and the parallel arena fill phase
//!
//! For one sequence the extractor optionally masks a private copy of the
//! residues, slides a window of length k computing the exact k-mer code
//! and the sampling hash incrementally, skips windows touching an unknown
//! residue, ranks the surviving windows by `(hash, code)` and keeps the
//! first `top_kmers` — a deterministic min-hash style sample that is
//! stable across runs and thread counts.
//!
//! The fill phase runs one worker per domain range. Workers append
//! records into the shared arena through per-thread buffers flushed with
//! a single atomic reservation, so the only shared-state writes of the
//! whole pipeline are lock-free.

use std::ops::Range;

use tracing::debug;

use crate::alphabet::Alphabet;
use crate::constants::{MAX_KMER_POSITION, SENTINEL_CODE};
use crate::error::KmatchError;
use crate::hasher::RollingHasher;
use crate::kmer::KmerCoder;
use crate::masking::Masker;
use crate::sequence_store::SequenceStore;

use super::arena::RecordArena;

/// Records buffered per worker before one atomic arena reservation.
const FLUSH_BUFFER_RECORDS: usize = 1024;

/// One sampled k-mer occurrence.
///
/// After cluster assignment the fields are reused: `kmer_code` holds the
/// representative's sequence id (or the sentinel for dropped records) and
/// `position` the signed diagonal relative to the representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerRecord {
    /// Canonical integer k-mer code, later the representative id
    pub kmer_code: u64,
    /// Owning sequence id
    pub seq_id: u32,
    /// Owning sequence length (saturated to u16)
    pub seq_len: u16,
    /// Window start position, later the signed diagonal
    pub position: i16,
}

impl KmerRecord {
    /// A record carrying the sentinel code (unfilled or dropped).
    pub fn sentinel() -> Self {
        Self {
            kmer_code: SENTINEL_CODE,
            seq_id: u32::MAX,
            seq_len: 0,
            position: 0,
        }
    }
}

/// One candidate window of a single sequence, before sampling.
#[derive(Debug, Clone, Copy)]
struct WindowCandidate {
    hash: u16,
    code: u64,
    position: i16,
}

/// Per-thread k-mer extractor.
pub struct SequenceKmerExtractor<'a> {
    alphabet: &'a Alphabet,
    coder: KmerCoder,
    hasher: RollingHasher,
    masker: Option<Masker>,
    k: usize,
    top_kmers: usize,
    residues: Vec<u8>,
    candidates: Vec<WindowCandidate>,
}

impl<'a> SequenceKmerExtractor<'a> {
    /// Create an extractor. `mask` selects low-complexity masking.
    pub fn new(
        alphabet: &'a Alphabet,
        k: usize,
        top_kmers: usize,
        hash_shift: u32,
        mask: bool,
    ) -> Self {
        Self {
            alphabet,
            coder: KmerCoder::new(k, alphabet.size()),
            hasher: RollingHasher::new(k, hash_shift),
            masker: mask.then(|| Masker::new(alphabet.unknown_code())),
            k,
            top_kmers,
            residues: Vec::new(),
            candidates: Vec::new(),
        }
    }

    /// Extract the sampled k-mer records of one sequence into `out`.
    ///
    /// Reads only the shared store slice; masking operates on a private
    /// copy. Produces at most `top_kmers` records; a sequence with no
    /// qualifying window contributes nothing.
    pub fn extract(&mut self, seq_id: u32, residues: &[u8], out: &mut Vec<KmerRecord>) {
        let seq_len = residues.len();
        if seq_len < self.k {
            return;
        }

        self.residues.clear();
        self.residues.extend_from_slice(residues);
        if let Some(masker) = &self.masker {
            masker.mask(&mut self.residues);
        }

        self.collect_candidates();
        if self.candidates.is_empty() {
            return;
        }

        // Min-hash style deterministic sample: rank by hash, tie-break by
        // exact code, keep the head.
        self.candidates
            .sort_unstable_by_key(|c| (c.hash, c.code));

        let seq_len_u16 = seq_len.min(u16::MAX as usize) as u16;
        for candidate in self.candidates.iter().take(self.top_kmers) {
            out.push(KmerRecord {
                kmer_code: candidate.code,
                seq_id,
                seq_len: seq_len_u16,
                position: candidate.position,
            });
        }
    }

    fn collect_candidates(&mut self) {
        self.candidates.clear();
        let seq = &self.residues;
        let k = self.k;
        let last_start = (seq.len() - k).min(MAX_KMER_POSITION);
        if seq.len() - k > MAX_KMER_POSITION {
            debug!(
                "sequence of length {} exceeds addressable positions, sampling its prefix",
                seq.len()
            );
        }

        // Track the most recent unknown residue; a window starting after
        // it is clean. Hash and code roll over every window so the
        // recurrences stay aligned with the sequence.
        let mut last_unknown: isize = -1;
        for (i, &c) in seq[..k].iter().enumerate() {
            if self.alphabet.is_unknown(c) {
                last_unknown = i as isize;
            }
        }
        let mut code = self.coder.encode(&seq[..k]);
        let mut hash = self.hasher.hash(&seq[..k]);

        for start in 0..=last_start {
            if start > 0 {
                let incoming = seq[start + k - 1];
                code = self.coder.roll(code, seq[start - 1], incoming);
                hash = self.hasher.next(hash, seq[start - 1], incoming);
                if self.alphabet.is_unknown(incoming) {
                    last_unknown = (start + k - 1) as isize;
                }
            }
            if last_unknown < start as isize {
                self.candidates.push(WindowCandidate {
                    hash,
                    code,
                    position: start as i16,
                });
            }
        }
    }
}

/// Which k-mer codes a fill pass keeps.
#[derive(Debug, Clone, Copy)]
pub struct SplitFilter {
    /// Total number of splits
    pub splits: usize,
    /// Index of the split being filled
    pub split: usize,
}

impl SplitFilter {
    /// The single-pass filter that keeps everything.
    pub fn all() -> Self {
        Self { splits: 1, split: 0 }
    }

    #[inline]
    fn keeps(&self, kmer_code: u64) -> bool {
        self.splits <= 1 || kmer_code % self.splits as u64 == self.split as u64
    }
}

/// Fill the arena from the store, one worker thread per domain range.
#[allow(clippy::too_many_arguments)]
pub fn fill_arena(
    store: &dyn SequenceStore,
    ranges: &[Range<u32>],
    arena: &RecordArena,
    alphabet: &Alphabet,
    k: usize,
    top_kmers: usize,
    hash_shift: u32,
    mask: bool,
    filter: SplitFilter,
) -> Result<(), KmatchError> {
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(ranges.len());
        for range in ranges {
            let range = range.clone();
            handles.push(scope.spawn(move || {
                fill_range(
                    store, range, arena, alphabet, k, top_kmers, hash_shift, mask, filter,
                )
            }));
        }
        for handle in handles {
            handle.join().expect("extraction worker panicked")?;
        }
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
fn fill_range(
    store: &dyn SequenceStore,
    range: Range<u32>,
    arena: &RecordArena,
    alphabet: &Alphabet,
    k: usize,
    top_kmers: usize,
    hash_shift: u32,
    mask: bool,
    filter: SplitFilter,
) -> Result<(), KmatchError> {
    let mut extractor = SequenceKmerExtractor::new(alphabet, k, top_kmers, hash_shift, mask);
    let mut sampled = Vec::with_capacity(top_kmers);
    let mut buffer: Vec<KmerRecord> = Vec::with_capacity(FLUSH_BUFFER_RECORDS);

    for seq_id in range {
        sampled.clear();
        extractor.extract(seq_id, store.residues(seq_id), &mut sampled);
        for record in sampled.iter().filter(|r| filter.keeps(r.kmer_code)) {
            buffer.push(*record);
            if buffer.len() >= FLUSH_BUFFER_RECORDS {
                arena.push_batch(&buffer)?;
                buffer.clear();
            }
        }
    }
    arena.push_batch(&buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence_store::InMemorySequenceStore;

    fn full_alphabet_extractor(
        alphabet: &Alphabet,
        k: usize,
        top_kmers: usize,
    ) -> SequenceKmerExtractor<'_> {
        SequenceKmerExtractor::new(alphabet, k, top_kmers, 5, false)
    }

    #[test]
    fn test_output_bounded_by_top_kmers() {
        let alphabet = Alphabet::full();
        let mut extractor = full_alphabet_extractor(&alphabet, 4, 5);
        let seq: Vec<u8> = (0..40u32).map(|i| ((i * 7 + 1) % 20) as u8).collect();

        let mut out = Vec::new();
        extractor.extract(3, &seq, &mut out);
        assert_eq!(out.len(), 5);
        for record in &out {
            assert_eq!(record.seq_id, 3);
            assert_eq!(record.seq_len, 40);
            assert_eq!(record.kmer_code, {
                let p = record.position as usize;
                KmerCoder::new(4, 21).encode(&seq[p..p + 4])
            });
        }
    }

    #[test]
    fn test_short_sequence_yields_nothing() {
        let alphabet = Alphabet::full();
        let mut extractor = full_alphabet_extractor(&alphabet, 10, 5);
        let mut out = Vec::new();
        extractor.extract(0, &[1, 2, 3], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_windows_skipped() {
        let alphabet = Alphabet::full();
        let unknown = alphabet.unknown_code();
        let mut extractor = full_alphabet_extractor(&alphabet, 3, 100);

        // Unknown residue at position 4 poisons windows starting at 2..=4.
        let seq = vec![0u8, 1, 2, 3, unknown, 5, 6, 7, 8];
        let mut out = Vec::new();
        extractor.extract(0, &seq, &mut out);

        let positions: Vec<i16> = {
            let mut p: Vec<i16> = out.iter().map(|r| r.position).collect();
            p.sort_unstable();
            p
        };
        assert_eq!(positions, vec![0, 1, 5, 6]);
    }

    #[test]
    fn test_sample_is_deterministic() {
        let alphabet = Alphabet::full();
        let seq: Vec<u8> = (0..60u32).map(|i| ((i * 11 + 5) % 20) as u8).collect();

        let mut out1 = Vec::new();
        full_alphabet_extractor(&alphabet, 6, 10).extract(0, &seq, &mut out1);
        let mut out2 = Vec::new();
        full_alphabet_extractor(&alphabet, 6, 10).extract(0, &seq, &mut out2);
        assert_eq!(out1, out2);
    }

    #[test]
    fn test_fully_masked_sequence_yields_nothing() {
        let alphabet = Alphabet::full();
        let mut extractor = SequenceKmerExtractor::new(&alphabet, 10, 10, 5, true);
        // A pure homopolymer masks down to nothing extractable: only the
        // short warm-up prefix stays unmasked, and it is shorter than k.
        let seq = vec![4u8; 50];
        let mut out = Vec::new();
        extractor.extract(0, &seq, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_fill_arena_collects_all_ranges() {
        let alphabet = Alphabet::full();
        let mut store = InMemorySequenceStore::new();
        let seq_a: Vec<u8> = (0..30u32).map(|i| ((i * 7 + 1) % 20) as u8).collect();
        let seq_b: Vec<u8> = (0..25u32).map(|i| ((i * 3 + 2) % 20) as u8).collect();
        store.push("a", &seq_a);
        store.push("b", &seq_b);

        let arena = RecordArena::new(16);
        let ranges = vec![0..1u32, 1..2u32];
        fill_arena(
            &store,
            &ranges,
            &arena,
            &alphabet,
            5,
            8,
            5,
            false,
            SplitFilter::all(),
        )
        .unwrap();

        let records = arena.into_records();
        assert_eq!(records.len(), 16);
        assert_eq!(records.iter().filter(|r| r.seq_id == 0).count(), 8);
        assert_eq!(records.iter().filter(|r| r.seq_id == 1).count(), 8);
    }

    #[test]
    fn test_split_filter_partitions_codes() {
        let alphabet = Alphabet::full();
        let mut store = InMemorySequenceStore::new();
        let seq: Vec<u8> = (0..40u32).map(|i| ((i * 13 + 3) % 20) as u8).collect();
        store.push("a", &seq);

        let mut all = Vec::new();
        SequenceKmerExtractor::new(&alphabet, 5, 100, 5, false).extract(0, &seq, &mut all);

        let mut by_split = Vec::new();
        for split in 0..3 {
            let arena = RecordArena::new(all.len());
            fill_arena(
                &store,
                &[0..1u32],
                &arena,
                &alphabet,
                5,
                100,
                5,
                false,
                SplitFilter { splits: 3, split },
            )
            .unwrap();
            by_split.extend(arena.into_records());
        }

        // The three splits exactly partition the single-pass record set.
        let key = |r: &KmerRecord| (r.kmer_code, r.position);
        let mut expected: Vec<_> = all.iter().map(key).collect();
        expected.sort_unstable();
        let mut actual: Vec<_> = by_split.iter().map(key).collect();
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }
}
