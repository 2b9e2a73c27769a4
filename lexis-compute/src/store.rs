//! # Lexicon Store
//!
//! Owns every pool, the cosine workspace, the global event counter `N`
//! and the dispatch log. Each public method is one host-level stage: it
//! validates its input, runs its dispatches and reports.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use lexis_core::batch::{ClassAssignment, ParseBatch, SentenceBatch};
use lexis_core::config::{CountingStrategy, EngineConfig};
use lexis_core::error::{LexisError, LexisResult};
use lexis_core::soa::{
    CandidateHit, CandidateRecord, MiHit, PairMiRecord, PairRecord, SectionRecord, WordRecord,
};
use lexis_core::traits::{
    CosineReport, CountingReport, FilterOutput, MiMode, MiStats, PoolStats, SectionReport,
    SubstitutionReport,
};

use crate::kernels::atomspace::{self, same_len};
use crate::kernels::{cosine, counting, mi, sections, substitute};
use crate::kernels::{CosineWorkspace, DispatchLog, SentenceLocator};
use crate::pool::{CandidatePool, Columns, PairPool, RecordPool, SectionPool, WordPool};

/// Load factor past which probe chains get long
const CROWDED_LOAD_FACTOR: f64 = 0.5;

/// Word, pair, section and candidate pools plus the global counters
pub struct LexiconStore {
    config: EngineConfig,
    words: WordPool,
    pairs: PairPool,
    sections: SectionPool,
    cosine: CosineWorkspace,
    total_events: AtomicU64,
    log: DispatchLog,
}

impl LexiconStore {
    pub fn new(config: &EngineConfig) -> LexisResult<Self> {
        config.validate()?;
        let cap = &config.capacity;

        let store = Self {
            config: config.clone(),
            words: WordPool::new("word", cap.word_pool, cap.word_index)?,
            pairs: PairPool::new("pair", cap.pair_pool, cap.pair_index)?,
            sections: SectionPool::new("section", cap.section_pool, cap.section_index)?,
            cosine: CosineWorkspace::new(
                cap.word_pool,
                cap.section_pool,
                cap.disjunct_index,
                cap.candidate_pool,
                cap.candidate_index,
            )?,
            total_events: AtomicU64::new(0),
            log: DispatchLog::default(),
        };

        tracing::info!(
            "Lexicon store: {} words, {} pairs, {} sections, {} candidates (~{} MB)",
            cap.word_pool,
            cap.pair_pool,
            cap.section_pool,
            cap.candidate_pool,
            cap.memory_bytes() / (1024 * 1024)
        );
        Ok(store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn words(&self) -> &WordPool {
        &self.words
    }

    pub fn pairs(&self) -> &PairPool {
        &self.pairs
    }

    pub fn sections(&self) -> &SectionPool {
        &self.sections
    }

    pub fn candidates(&self) -> &CandidatePool {
        self.cosine.candidates()
    }

    pub fn log(&self) -> &DispatchLog {
        &self.log
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Acquire)
    }

    pub fn set_total_events(&self, total: u64) {
        self.total_events.store(total, Ordering::Release);
    }

    /// Sentence lookup for a batch, resolving `Auto` by batch size
    pub fn locator_for(&self, batch: &SentenceBatch) -> SentenceLocator {
        let compute = &self.config.compute;
        match compute.counting_strategy {
            CountingStrategy::Linear => SentenceLocator::Linear,
            CountingStrategy::BinarySearch => SentenceLocator::BinarySearch,
            CountingStrategy::Auto if batch.num_sentences() > compute.binary_search_threshold => {
                SentenceLocator::BinarySearch
            }
            CountingStrategy::Auto => SentenceLocator::Linear,
        }
    }

    fn check_words(&self, batch: &SentenceBatch) -> LexisResult<()> {
        match batch.max_word() {
            Some(max) if max as usize >= self.words.capacity() => Err(LexisError::malformed(
                format!("word id {} beyond word capacity {}", max, self.words.capacity()),
            )),
            _ => Ok(()),
        }
    }

    pub fn find_or_create_words(&self, hashes: &[u64]) -> LexisResult<Vec<u32>> {
        let out = atomspace::word_find_or_create(&self.log, &self.words, hashes)?;
        warn_if_crowded(&self.words);
        Ok(out)
    }

    pub fn find_or_create_pairs(&self, word_a: &[u32], word_b: &[u32]) -> LexisResult<Vec<u32>> {
        let out = atomspace::pair_find_or_create(&self.log, &self.pairs, word_a, word_b)?;
        warn_if_crowded(&self.pairs);
        Ok(out)
    }

    pub fn find_or_create_sections(&self, words: &[u32], disjuncts: &[u64]) -> LexisResult<Vec<u32>> {
        let out = atomspace::section_find_or_create(&self.log, &self.sections, words, disjuncts)?;
        warn_if_crowded(&self.sections);
        Ok(out)
    }

    pub fn count_pairs(&self, indices: &[u32]) -> LexisResult<()> {
        let n = atomspace::count_pairs(
            &self.log,
            &self.words,
            &self.pairs,
            indices,
            &self.total_events,
        )?;
        tracing::debug!("Counted {} pair observations by index", n);
        Ok(())
    }

    pub fn count_sections(&self, indices: &[u32]) -> LexisResult<()> {
        atomspace::count_sections(&self.log, &self.sections, indices)
    }

    pub fn count_sentences(&self, batch: &SentenceBatch, window: u32) -> LexisResult<CountingReport> {
        self.check_words(batch)?;
        let locator = self.locator_for(batch);
        let events = counting::count_sentence_pairs(
            &self.log,
            batch,
            window,
            locator,
            &self.words,
            &self.pairs,
            &self.total_events,
        )?;

        let report = CountingReport {
            events,
            total_events: self.total_events(),
            pairs: self.pairs.len(),
        };
        tracing::debug!(
            "Counted {} sentences ({:?}, window {}): {} events, N = {}, {} pairs",
            batch.num_sentences(),
            locator,
            window,
            report.events,
            report.total_events,
            report.pairs
        );
        warn_if_crowded(&self.pairs);
        Ok(report)
    }

    pub fn compute_mi(&self, mode: MiMode) -> usize {
        let n = self.total_events() as f64;
        let touched = match mode {
            MiMode::All => mi::compute_mi_all(&self.log, &self.words, &self.pairs, n),
            MiMode::Dirty => mi::compute_mi_dirty(&self.log, &self.words, &self.pairs, n),
        };
        tracing::debug!("MI ({:?}) recomputed for {} pairs, N = {}", mode, touched, n);
        touched
    }

    pub fn mi_stats(&self, threshold: f64) -> MiStats {
        let (nonzero, positive, above_threshold) = mi::mi_stats(&self.log, &self.pairs, threshold);
        MiStats {
            nonzero,
            positive,
            above_threshold,
        }
    }

    pub fn mi_filter(&self, threshold: f64, max_out: usize) -> FilterOutput<MiHit> {
        let (hits, total_matches) = mi::mi_filter(&self.log, &self.pairs, threshold, max_out);
        let out = FilterOutput {
            hits,
            total_matches,
        };
        if out.truncated() {
            tracing::warn!(
                "MI filter kept {} of {} pairs above {}",
                out.hits.len(),
                out.total_matches,
                threshold
            );
        }
        out
    }

    pub fn extract_sections(&self, batch: &ParseBatch) -> LexisResult<SectionReport> {
        self.check_words(batch.sentences())?;
        let locator = self.locator_for(batch.sentences());
        let (observed, created) =
            sections::extract_sections(&self.log, batch, locator, &self.sections)?;

        let report = SectionReport {
            observed,
            created,
            sections: self.sections.len(),
        };
        tracing::debug!(
            "Extracted sections from {} parses: {} observed, {} new, {} total",
            batch.sentences().num_sentences(),
            report.observed,
            report.created,
            report.sections
        );
        warn_if_crowded(&self.sections);
        Ok(report)
    }

    pub fn compute_cosines(&mut self) -> LexisResult<CosineReport> {
        let (chained, disjuncts, candidates) =
            cosine::similarity_pass(&self.log, &self.sections, &mut self.cosine)?;
        let report = CosineReport {
            chained,
            disjuncts,
            candidates,
        };
        tracing::debug!(
            "Cosine pass: {} sections over {} disjuncts, {} candidates",
            report.chained,
            report.disjuncts,
            report.candidates
        );
        warn_if_crowded(self.cosine.candidates());
        Ok(report)
    }

    pub fn filter_candidates(&self, threshold: f64, max_out: usize) -> FilterOutput<CandidateHit> {
        let (hits, total_matches) =
            cosine::filter_candidates(&self.log, &self.cosine, threshold, max_out);
        let out = FilterOutput {
            hits,
            total_matches,
        };
        if out.truncated() {
            tracing::warn!(
                "Candidate filter kept {} of {} above cosine {}",
                out.hits.len(),
                out.total_matches,
                threshold
            );
        }
        out
    }

    pub fn assign_classes(&self, assignment: &ClassAssignment) -> LexisResult<()> {
        substitute::assign_classes(&self.log, &self.words, assignment)?;
        tracing::debug!("Assigned {} words to classes", assignment.len());
        Ok(())
    }

    pub fn substitute_pairs(&self) -> SubstitutionReport {
        let (pairs_changed, eliminated) =
            substitute::substitute_pairs(&self.log, &self.words, &self.pairs);
        tracing::debug!(
            "Substituted pairs: {} changed, {} eliminated",
            pairs_changed,
            eliminated
        );
        SubstitutionReport {
            pairs_changed,
            eliminated,
            ..Default::default()
        }
    }

    pub fn rebuild_pair_index(&mut self) -> LexisResult<usize> {
        let merged = substitute::rebuild_pair_index(&self.log, &mut self.pairs)?;
        tracing::debug!("Rebuilt pair index, {} pairs merged", merged);
        Ok(merged)
    }

    pub fn substitute_section_words(&self) -> usize {
        let changed = substitute::substitute_section_words(&self.log, &self.words, &self.sections);
        tracing::debug!("Substituted {} section words", changed);
        changed
    }

    /// Recompute marginals from live pairs and set `N` to the pair mass
    pub fn rebuild_marginals(&self) -> LexisResult<u64> {
        let mass = substitute::rebuild_marginals(&self.log, &self.words, &self.pairs)?;
        let total = mass.round() as u64;
        self.set_total_events(total);
        tracing::debug!("Rebuilt word marginals, N = {}", total);
        Ok(total)
    }

    pub fn load_pair_counts(&self, indices: &[u32], counts: &[f64]) -> LexisResult<()> {
        same_len("load_pair_counts", indices.len(), counts.len())?;
        let cols = self.pairs.columns();
        for (&slot, &count) in indices.iter().zip(counts) {
            let slot = self.pairs.check(slot)?;
            cols.count[slot].store(count);
            cols.mark_dirty(slot);
        }
        Ok(())
    }

    pub fn load_section_counts(&self, indices: &[u32], counts: &[f64]) -> LexisResult<()> {
        same_len("load_section_counts", indices.len(), counts.len())?;
        for (&slot, &count) in indices.iter().zip(counts) {
            let slot = self.sections.check(slot)?;
            self.sections.columns().count[slot].store(count);
        }
        Ok(())
    }

    pub fn load_word_counts(&self, words: &[u32], counts: &[f64]) -> LexisResult<()> {
        same_len("load_word_counts", words.len(), counts.len())?;
        for (&word, &count) in words.iter().zip(counts) {
            let word = self.words.check_id(word)?;
            self.words.columns().count[word].store(count);
        }
        Ok(())
    }

    pub fn read_words(&self) -> Vec<WordRecord> {
        self.words.read_all()
    }

    pub fn read_pairs(&self) -> Vec<PairRecord> {
        self.pairs.read_all()
    }

    pub fn read_pairs_with_mi(&self) -> Vec<PairMiRecord> {
        let marginals = &self.words.columns().count;
        let marginal = |w: u32| marginals.get(w as usize).map_or(0.0, |m| m.load());
        self.pairs
            .read_all()
            .into_par_iter()
            .map(|p| PairMiRecord {
                count: p.count,
                mi: p.mi,
                marginal_a: marginal(p.word_a),
                marginal_b: marginal(p.word_b),
                word_a: p.word_a,
                word_b: p.word_b,
                flags: p.flags,
                _pad: 0,
            })
            .collect()
    }

    pub fn read_sections(&self) -> Vec<SectionRecord> {
        self.sections.read_all()
    }

    pub fn read_candidates(&self) -> Vec<CandidateRecord> {
        self.cosine.candidates().read_all()
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            words: self.words.len(),
            pairs: self.pairs.len(),
            sections: self.sections.len(),
            candidates: self.cosine.candidates().len(),
        }
    }

    /// Empty every pool and index and zero `N`
    pub fn reset(&mut self) {
        self.words.reset();
        self.pairs.reset();
        self.sections.reset();
        self.cosine.reset();
        *self.total_events.get_mut() = 0;
        tracing::debug!("Lexicon store reset");
    }
}

fn warn_if_crowded<C: Columns>(pool: &RecordPool<C>) {
    let load = pool.len() as f64 / pool.index().capacity() as f64;
    if load > CROWDED_LOAD_FACTOR {
        tracing::warn!(
            "{} index is {:.0}% full ({} of {} slots)",
            pool.name(),
            load * 100.0,
            pool.len(),
            pool.index().capacity()
        );
    }
}
