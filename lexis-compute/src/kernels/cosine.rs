//! # Cosine Similarity
//!
//! Each word is a vector over disjuncts, weighted by section count. The
//! pass runs four dispatches back to back:
//!
//! 1. **Norms**: every section adds `count²` to its word's norm
//! 2. **Chains**: sections sharing a disjunct are linked into one list,
//!    headed from an inverted index keyed by the disjunct hash
//! 3. **Dot products**: every section walks its chain and adds
//!    `count_a * count_b` to the candidate of each larger word it meets
//! 4. **Cosines**: `dot / sqrt(norm_a * norm_b)`, or 0 for a zero norm
//!
//! A word holds at most one section per disjunct, so walking only toward
//! larger words visits each shared disjunct once per word pair.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use rayon::prelude::*;

use lexis_core::error::{LexisError, LexisResult};
use lexis_core::hash::pair_key;
use lexis_core::soa::CandidateHit;
use lexis_core::EMPTY_VALUE;

use crate::atomic::{f64_column, AtomicF64};
use crate::hashtable::ConcurrentHashIndex;
use crate::kernels::dispatch::{dispatch, dispatch_infallible, Compactor, DispatchLog};
use crate::pool::{CandidatePool, SectionPool};

/// Scratch state owned by the cosine pass.
///
/// Rebuilt from the section pool on every pass.
pub struct CosineWorkspace {
    norms: Box<[AtomicF64]>,
    heads: ConcurrentHashIndex,
    next: Box<[AtomicU32]>,
    candidates: CandidatePool,
}

impl CosineWorkspace {
    pub fn new(
        word_capacity: usize,
        section_capacity: usize,
        disjunct_index: usize,
        candidate_capacity: usize,
        candidate_index: usize,
    ) -> LexisResult<Self> {
        Ok(Self {
            norms: f64_column(word_capacity, 0.0),
            heads: ConcurrentHashIndex::new("disjunct index", disjunct_index)?,
            next: (0..section_capacity)
                .map(|_| AtomicU32::new(EMPTY_VALUE))
                .collect(),
            candidates: CandidatePool::new("candidate", candidate_capacity, candidate_index)?,
        })
    }

    pub fn candidates(&self) -> &CandidatePool {
        &self.candidates
    }

    /// Squared norm of `word`'s disjunct vector
    pub fn norm_squared(&self, word: u32) -> f64 {
        self.norms.get(word as usize).map_or(0.0, |n| n.load())
    }

    /// Distinct disjuncts currently chained
    pub fn disjuncts(&self) -> usize {
        self.heads.len()
    }

    pub fn reset(&mut self) {
        self.norms.par_iter().for_each(|n| n.store(0.0));
        self.heads.clear();
        self.next
            .par_iter_mut()
            .for_each(|n| *n.get_mut() = EMPTY_VALUE);
        self.candidates.reset();
    }

    fn norm_slot(&self, word: u32) -> LexisResult<&AtomicF64> {
        self.norms.get(word as usize).ok_or_else(|| {
            LexisError::malformed(format!(
                "section word {} beyond word capacity {}",
                word,
                self.norms.len()
            ))
        })
    }
}

#[inline]
fn live_section(sections: &SectionPool, slot: usize) -> Option<(u32, f64)> {
    let cols = sections.columns();
    let count = cols.count[slot].load();
    (count > 0.0).then(|| (cols.word[slot].load(Ordering::Acquire), count))
}

/// Step 1: accumulate `count²` per word
pub fn compute_word_norms(
    log: &DispatchLog,
    sections: &SectionPool,
    ws: &CosineWorkspace,
) -> LexisResult<()> {
    dispatch(log, sections.len(), |slot| {
        if let Some((word, count)) = live_section(sections, slot) {
            ws.norm_slot(word)?.fetch_add(count * count);
        }
        Ok(())
    })
}

/// Step 2: link every live section into its disjunct's chain.
///
/// Returns the number of sections chained.
pub fn build_disjunct_chains(
    log: &DispatchLog,
    sections: &SectionPool,
    ws: &CosineWorkspace,
) -> LexisResult<usize> {
    let chained = AtomicUsize::new(0);
    dispatch(log, sections.len(), |slot| {
        if live_section(sections, slot).is_none() {
            return Ok(());
        }
        let djh = sections.columns().disjunct[slot].load(Ordering::Acquire);
        let previous = ws.heads.push_front(djh, slot as u32)?;
        ws.next[slot].store(previous, Ordering::Release);
        chained.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;
    Ok(chained.into_inner())
}

/// Step 3: add shared-disjunct products into candidates
pub fn accumulate_dot_products(
    log: &DispatchLog,
    sections: &SectionPool,
    ws: &CosineWorkspace,
) -> LexisResult<()> {
    let cols = sections.columns();
    dispatch(log, sections.len(), |slot| {
        let Some((word_a, count_a)) = live_section(sections, slot) else {
            return Ok(());
        };
        let djh = cols.disjunct[slot].load(Ordering::Acquire);

        let mut cursor = ws.heads.lookup(djh);
        while cursor != EMPTY_VALUE {
            let other = cursor as usize;
            let word_b = cols.word[other].load(Ordering::Acquire);
            if word_b > word_a {
                let count_b = cols.count[other].load();
                let (cand, _) = ws
                    .candidates
                    .find_or_create(pair_key(word_a, word_b), |c, s| {
                        c.word_a[s].store(word_a, Ordering::Relaxed);
                        c.word_b[s].store(word_b, Ordering::Relaxed);
                    })?;
                ws.candidates.columns().dot[cand as usize].fetch_add(count_a * count_b);
            }
            cursor = ws.next[other].load(Ordering::Acquire);
        }
        Ok(())
    })
}

/// Step 4: cosine for every candidate
pub fn compute_cosines(log: &DispatchLog, ws: &CosineWorkspace) {
    let cols = ws.candidates.columns();
    dispatch_infallible(log, ws.candidates.len(), |slot| {
        let norm_a = ws.norm_squared(cols.word_a[slot].load(Ordering::Acquire));
        let norm_b = ws.norm_squared(cols.word_b[slot].load(Ordering::Acquire));
        let cosine = if norm_a > 0.0 && norm_b > 0.0 {
            cols.dot[slot].load() / (norm_a * norm_b).sqrt()
        } else {
            0.0
        };
        cols.cosine[slot].store(cosine);
    });
}

/// Reset the workspace and run all four steps.
///
/// Returns `(chained, disjuncts, candidates)`.
pub fn similarity_pass(
    log: &DispatchLog,
    sections: &SectionPool,
    ws: &mut CosineWorkspace,
) -> LexisResult<(usize, usize, usize)> {
    ws.reset();
    compute_word_norms(log, sections, ws)?;
    let chained = build_disjunct_chains(log, sections, ws)?;
    accumulate_dot_products(log, sections, ws)?;
    compute_cosines(log, ws);
    Ok((chained, ws.disjuncts(), ws.candidates.len()))
}

/// Candidates whose cosine exceeds `threshold`, at most `max_out` of them
pub fn filter_candidates(
    log: &DispatchLog,
    ws: &CosineWorkspace,
    threshold: f64,
    max_out: usize,
) -> (Vec<CandidateHit>, usize) {
    let num = ws.candidates.len();
    let out = Compactor::new(max_out, num);
    let cols = ws.candidates.columns();
    dispatch_infallible(log, num, |slot| {
        let cosine = cols.cosine[slot].load();
        if cosine > threshold {
            out.push(CandidateHit {
                cosine,
                word_a: cols.word_a[slot].load(Ordering::Acquire),
                word_b: cols.word_b[slot].load(Ordering::Acquire),
            });
        }
    });
    out.finish()
}
