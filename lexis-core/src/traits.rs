//! # Traits - Stage Entry Points
//!
//! `ComputeBackend` is the seam between host orchestration and the engine
//! that owns the pools. Every stage is one call; when a call returns, all
//! of its work-items have finished, so the next call sees a settled
//! snapshot.
//!
//! ## Pipeline
//!
//! ```text
//! count_sentences ─▶ compute_mi ─▶ mi_filter
//!        ▲                              │
//!        └──── substitute ◀─ assign_classes
//!
//! extract_sections ─▶ compute_cosines ─▶ filter_candidates
//! ```

use crate::batch::{ClassAssignment, ParseBatch, SentenceBatch};
use crate::error::LexisResult;
use crate::soa::{
    CandidateHit, CandidateRecord, MiHit, PairMiRecord, PairRecord, SectionRecord, WordRecord,
};

/// Compute backend trait
///
/// Implementations own the Word, Pair, Section and Candidate pools for
/// their whole lifetime. Records are never removed, only zeroed.
pub trait ComputeBackend: Send + Sync {
    /// Find or create one Word per name hash, returning pool indices
    fn find_or_create_words(&mut self, hashes: &[u64]) -> LexisResult<Vec<u32>>;

    /// Find or create one Pair per `(a[i], b[i])`, in canonical order
    fn find_or_create_pairs(&mut self, word_a: &[u32], word_b: &[u32]) -> LexisResult<Vec<u32>>;

    /// Find or create one Section per `(word[i], disjunct[i])`
    fn find_or_create_sections(&mut self, words: &[u32], disjuncts: &[u64])
        -> LexisResult<Vec<u32>>;

    /// Observe existing pairs by index: count, marginals and dirty flag
    fn count_pairs(&mut self, pairs: &[u32]) -> LexisResult<()>;

    /// Observe existing sections by index
    fn count_sections(&mut self, sections: &[u32]) -> LexisResult<()>;

    /// Count every within-window pair of every sentence
    fn count_sentences(&mut self, batch: &SentenceBatch, window: u32)
        -> LexisResult<CountingReport>;

    /// Recompute pointwise mutual information; returns pairs recomputed
    fn compute_mi(&mut self, mode: MiMode) -> LexisResult<usize>;

    /// Count pairs with mass, with positive MI, and with MI above `threshold`
    fn mi_stats(&mut self, threshold: f64) -> MiStats;

    /// Up to `max_out` pairs whose MI exceeds `threshold`
    fn mi_filter(&mut self, threshold: f64, max_out: usize) -> FilterOutput<MiHit>;

    /// Build and count one Section per token that has at least one edge
    fn extract_sections(&mut self, batch: &ParseBatch) -> LexisResult<SectionReport>;

    /// Rebuild the candidate pool from the current sections
    fn compute_cosines(&mut self) -> LexisResult<CosineReport>;

    /// Up to `max_out` candidates whose cosine exceeds `threshold`
    fn filter_candidates(&mut self, threshold: f64, max_out: usize) -> FilterOutput<CandidateHit>;

    /// Write word → class ids
    fn assign_classes(&mut self, assignment: &ClassAssignment) -> LexisResult<()>;

    /// Rewrite pair endpoints to classes, eliminating self-pairs
    fn substitute_pairs(&mut self) -> LexisResult<SubstitutionReport>;

    /// Re-index live pairs, merging those that now share a key
    fn rebuild_pair_index(&mut self) -> LexisResult<usize>;

    /// Rewrite section words to classes; returns sections changed
    fn substitute_section_words(&mut self) -> LexisResult<usize>;

    /// Full substitution pass: pairs, index rebuild, then sections
    fn substitute(&mut self) -> LexisResult<SubstitutionReport> {
        let mut report = self.substitute_pairs()?;
        report.merged = self.rebuild_pair_index()?;
        report.sections_changed = self.substitute_section_words()?;
        Ok(report)
    }

    /// Recompute word marginals and `N` from live pairs; returns the new `N`
    fn rebuild_marginals(&mut self) -> LexisResult<u64>;

    /// Overwrite pair counts and mark them dirty
    fn load_pair_counts(&mut self, pairs: &[u32], counts: &[f64]) -> LexisResult<()>;

    /// Overwrite section counts
    fn load_section_counts(&mut self, sections: &[u32], counts: &[f64]) -> LexisResult<()>;

    /// Overwrite word marginal counts
    fn load_word_counts(&mut self, words: &[u32], counts: &[f64]) -> LexisResult<()>;

    /// Overwrite the total observation count `N`
    fn set_total_events(&mut self, total: u64);

    /// Total observation count `N`
    fn total_events(&self) -> u64;

    fn read_words(&self) -> Vec<WordRecord>;

    fn read_pairs(&self) -> Vec<PairRecord>;

    /// Pairs joined with both endpoint marginals
    fn read_pairs_with_mi(&self) -> Vec<PairMiRecord>;

    fn read_sections(&self) -> Vec<SectionRecord>;

    fn read_candidates(&self) -> Vec<CandidateRecord>;

    /// Live record counts per pool
    fn pool_stats(&self) -> PoolStats;

    /// Empty every pool and index
    fn reset(&mut self);

    /// Get statistics about recent work
    fn stats(&self) -> BackendStats;

    /// Wait for outstanding work (no-op for synchronous backends)
    fn sync(&mut self) -> LexisResult<()>;

    /// Name of this backend (for logging)
    fn name(&self) -> &'static str;
}

/// Which pairs an MI pass recomputes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiMode {
    /// Every pair, unconditionally
    All,
    /// Only dirty pairs; clears the flag
    Dirty,
}

/// Statistics from the compute backend
#[derive(Clone, Debug, Default)]
pub struct BackendStats {
    /// Kernel dispatches issued
    pub dispatches: u64,

    /// Work-items executed across all dispatches
    pub work_items: u64,

    /// Dispatches that failed with a capacity overflow
    pub overflows: u64,

    /// Time spent on the last stage (microseconds)
    pub compute_time_us: u64,

    /// Time spent across all stages (microseconds)
    pub total_time_us: u64,
}

/// Live record counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub words: usize,
    pub pairs: usize,
    pub sections: usize,
    pub candidates: usize,
}

/// Result of a counting pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountingReport {
    /// Pair observations in this batch
    pub events: u64,

    /// `N` after the batch
    pub total_events: u64,

    /// Pairs in the pool after the batch
    pub pairs: usize,
}

/// MI summary counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MiStats {
    /// Pairs with count > 0
    pub nonzero: usize,

    /// Pairs with MI > 0
    pub positive: usize,

    /// Pairs with MI above the threshold
    pub above_threshold: usize,
}

/// Bounded filter output
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOutput<T> {
    /// Emitted rows, at most the requested bound
    pub hits: Vec<T>,

    /// Rows that matched, including those dropped by the bound
    pub total_matches: usize,
}

impl<T> FilterOutput<T> {
    /// True when matches were dropped for lack of room
    pub fn truncated(&self) -> bool {
        self.total_matches > self.hits.len()
    }
}

/// Result of a section extraction pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionReport {
    /// Tokens that produced a section
    pub observed: usize,

    /// Sections created by this pass
    pub created: usize,

    /// Sections in the pool after the pass
    pub sections: usize,
}

/// Result of a cosine pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CosineReport {
    /// Sections linked into disjunct chains
    pub chained: usize,

    /// Distinct disjuncts seen
    pub disjuncts: usize,

    /// Word pairs sharing at least one disjunct
    pub candidates: usize,
}

/// Result of a substitution pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// Pairs whose endpoints were rewritten
    pub pairs_changed: usize,

    /// Pairs that collapsed to a self-pair and were zeroed
    pub eliminated: usize,

    /// Pairs folded into another pair with the same key
    pub merged: usize,

    /// Sections whose word was rewritten
    pub sections_changed: usize,
}
