//! Pipeline orchestration
//!
//! Coordinates the fork-join phases of a prefilter run:
//! 1. Memory planning (estimate, budget, splits, sample degrade)
//! 2. Parallel extraction into the record arena
//! 3. Sort pass A, cluster assignment, sort pass B — per split
//! 4. Spill + pairwise merge when more than one split is needed
//! 5. Emission of hit records and singleton entries
//!
//! Phases never overlap; the only concurrent shared-state writes happen
//! inside the extraction phase. The two full sorts make the final output
//! deterministic for a given input and configuration, whatever the thread
//! count.

use std::time::Instant;

use tracing::info;

use crate::alphabet::Alphabet;
use crate::constants::SENTINEL_CODE;
use crate::error::KmatchError;
use crate::hit_store::HitWriter;
use crate::sequence_store::SequenceStore;

use super::arena::{self, MemoryPlan, RecordArena};
use super::cluster::{assign_representatives, sort_emission_order, sort_group_order};
use super::config::PrefilterConfig;
use super::emit::{emit_results, CandidateHit, EmitSummary};
use super::extraction::{fill_arena, KmerRecord, SplitFilter};
use super::partition::residue_balanced_ranges;
use super::spill::SpillRuns;

/// Counters reported after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefilterSummary {
    /// Input sequences
    pub sequences: usize,
    /// Sampled k-mer records over all splits
    pub records: usize,
    /// Splits the memory plan required
    pub splits: usize,
    /// Clusters written with at least one member
    pub clusters: usize,
    /// Member hits written
    pub members: usize,
    /// Singleton self-entries written
    pub singletons: usize,
}

/// The prefilter engine.
///
/// Construction validates the configuration (the unsupported masking mode
/// is rejected here, before any work); [`Prefilter::run`] executes the
/// phases against a sequence store and a hit writer.
pub struct Prefilter {
    config: PrefilterConfig,
    alphabet: Alphabet,
    k: usize,
}

impl Prefilter {
    /// Validate the configuration and resolve the k-mer parameters.
    pub fn new(config: PrefilterConfig) -> Result<Self, KmatchError> {
        config.validate()?;
        let (k, alphabet_size) = config.resolved_kmer_params();
        let alphabet = Alphabet::reduced(alphabet_size)
            .map_err(|e| KmatchError::InvalidConfig(e.to_string()))?;
        Ok(Self { config, alphabet, k })
    }

    /// The alphabet the run will use; the sequence store must be coded
    /// with it.
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Run the prefilter over `store`, writing hit records to `writer`.
    pub fn run<W: HitWriter + Send>(
        &self,
        store: &dyn SequenceStore,
        writer: &mut W,
    ) -> Result<PrefilterSummary, KmatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| KmatchError::InvalidConfig(format!("thread pool: {e}")))?;
        pool.install(|| self.run_inner(store, writer))
    }

    fn run_inner<W: HitWriter>(
        &self,
        store: &dyn SequenceStore,
        writer: &mut W,
    ) -> Result<PrefilterSummary, KmatchError> {
        let started = Instant::now();
        self.config.print();
        info!(
            "{} sequences, {} residues",
            store.count(),
            store.total_residues()
        );

        let plan = arena::plan_memory(
            store,
            self.k,
            self.config.top_kmers,
            self.config.ram_limit_gib,
            self.config.splits,
        )?;
        arena::log_plan(&plan, self.config.top_kmers);

        let threads = rayon::current_num_threads();
        let ranges = residue_balanced_ranges(store, threads);

        let mut total_records = 0usize;
        let emit_summary = if plan.splits == 1 {
            let records = self.process_split(store, &ranges, &plan, 0)?;
            total_records += records.len();
            let candidates = records
                .iter()
                .take_while(|r| r.kmer_code != SENTINEL_CODE)
                .map(|r| CandidateHit {
                    rep_id: r.kmer_code as u32,
                    member_id: r.seq_id,
                    diagonal: r.position,
                });
            emit_results(candidates, store, self.config.coverage, writer)?
        } else {
            let mut runs = SpillRuns::new(&self.config.tmp_dirname)?;
            for split in 0..plan.splits {
                info!("split {}/{}", split + 1, plan.splits);
                let records = self.process_split(store, &ranges, &plan, split)?;
                total_records += records.len();
                runs.write_split(split, &records)?;
            }
            let merged = runs.merge()?;
            emit_results(merged.into_iter(), store, self.config.coverage, writer)?
        };
        writer.finish()?;

        let summary = self.summarize(store, &plan, total_records, &emit_summary);
        info!(
            "prefilter finished in {:.2?}: {} clusters, {} members, {} singletons",
            started.elapsed(),
            summary.clusters,
            summary.members,
            summary.singletons
        );
        Ok(summary)
    }

    /// Extract, sort, assign and re-sort one split's records.
    fn process_split(
        &self,
        store: &dyn SequenceStore,
        ranges: &[std::ops::Range<u32>],
        plan: &MemoryPlan,
        split: usize,
    ) -> Result<Vec<KmerRecord>, KmatchError> {
        let phase = Instant::now();
        let arena = RecordArena::new(plan.arena_capacity);
        fill_arena(
            store,
            ranges,
            &arena,
            &self.alphabet,
            self.k,
            plan.top_kmers,
            self.config.hash_shift,
            self.config.mask_mode == 1,
            SplitFilter { splits: plan.splits, split },
        )?;
        let mut records = arena.into_records();
        info!(
            "extracted {} records in {:.2?}",
            records.len(),
            phase.elapsed()
        );

        let phase = Instant::now();
        sort_group_order(&mut records);
        let surviving = assign_representatives(&mut records);
        sort_emission_order(&mut records);
        info!(
            "grouped and assigned {} paired records in {:.2?}",
            surviving,
            phase.elapsed()
        );
        Ok(records)
    }

    fn summarize(
        &self,
        store: &dyn SequenceStore,
        plan: &MemoryPlan,
        records: usize,
        emit: &EmitSummary,
    ) -> PrefilterSummary {
        PrefilterSummary {
            sequences: store.count() as usize,
            records,
            splits: plan.splits,
            clusters: emit.clusters,
            members: emit.members,
            singletons: emit.singletons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit_store::MemoryHitStore;
    use crate::sequence_store::InMemorySequenceStore;

    fn coded_store(alphabet: &Alphabet, sequences: &[(&str, &str)]) -> InMemorySequenceStore {
        let mut store = InMemorySequenceStore::new();
        for (key, seq) in sequences {
            store.push(*key, &alphabet.encode_sequence(seq.as_bytes()));
        }
        store
    }

    fn test_config() -> PrefilterConfig {
        PrefilterConfig {
            kmer_length: 6,
            alphabet_size: 21,
            top_kmers: 20,
            coverage: 0.0,
            num_threads: 1,
            ram_limit_gib: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_produces_no_entries() {
        let prefilter = Prefilter::new(test_config()).unwrap();
        let store = InMemorySequenceStore::new();
        let mut writer = MemoryHitStore::new();
        let summary = prefilter.run(&store, &mut writer).unwrap();
        assert_eq!(summary.sequences, 0);
        assert_eq!(summary.clusters, 0);
        assert!(writer.entries.is_empty());
    }

    #[test]
    fn test_unrelated_sequences_become_singletons() {
        let prefilter = Prefilter::new(test_config()).unwrap();
        let store = coded_store(
            prefilter.alphabet(),
            &[
                ("a", "ACDEFGHIKLMNPQRSTVWY"),
                ("b", "WYVTSRQPNMLKIHGFEDCA"),
            ],
        );
        let mut writer = MemoryHitStore::new();
        let summary = prefilter.run(&store, &mut writer).unwrap();
        assert_eq!(summary.singletons, 2);
        assert_eq!(summary.clusters, 0);
        assert_eq!(writer.entries.len(), 2);
    }

    #[test]
    fn test_overlapping_sequences_cluster() {
        let prefilter = Prefilter::new(test_config()).unwrap();
        let long = "MKTAYIAKQRQISFVKSHFSRQLEERLGLI";
        let store = coded_store(
            prefilter.alphabet(),
            &[("long", long), ("short", &long[3..])],
        );
        let mut writer = MemoryHitStore::new();
        let summary = prefilter.run(&store, &mut writer).unwrap();
        assert_eq!(summary.clusters, 1);
        assert_eq!(summary.members, 1);
        assert_eq!(summary.singletons, 0);

        let (key, hits) = &writer.entries[0];
        assert_eq!(key, "long");
        assert_eq!(hits[1].target_key, "short");
        assert_eq!(hits[1].diagonal, 3);
    }
}
