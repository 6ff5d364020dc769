//! Prefilter pipeline
//!
//! The phases, in order:
//! 1. Plan memory (estimate, budget, split count, sample degrade)
//! 2. Extract sampled k-mers in parallel into the record arena
//! 3. Sort pass A (group-forming key)
//! 4. Assign cluster representatives and diagonals
//! 5. Sort pass B (cluster-emission key)
//! 6. Spill + merge, when the plan required more than one split
//! 7. Emit per-representative hit lists and singleton entries

pub mod arena;
pub mod cluster;
pub mod config;
pub mod emit;
pub mod extraction;
pub mod parse;
pub mod partition;
pub mod pipeline;
pub mod spill;

pub use config::PrefilterConfig;
pub use extraction::KmerRecord;
pub use pipeline::{Prefilter, PrefilterSummary};
