//! # Class Substitution
//!
//! Folding words into classes happens in place:
//!
//! ```text
//! assign_classes ─▶ substitute_pairs ─▶ rebuild_pair_index ─▶ substitute_section_words
//!                                                 │
//!                                                 ▼
//!                                         rebuild_marginals
//! ```
//!
//! Slots are never freed. A pair that collapses to a self-pair or loses a
//! merge keeps its slot with zero count.

use std::sync::atomic::{AtomicUsize, Ordering};

use lexis_core::batch::ClassAssignment;
use lexis_core::error::LexisResult;
use lexis_core::hash::{canonical, pair_key};

use crate::atomic::AtomicF64;
use crate::kernels::dispatch::{dispatch, dispatch_infallible, DispatchLog};
use crate::pool::{PairPool, SectionPool, WordPool};

/// Write `class_id` for every word in the assignment
pub fn assign_classes(
    log: &DispatchLog,
    words: &WordPool,
    assignment: &ClassAssignment,
) -> LexisResult<()> {
    let (ids, classes) = (assignment.words(), assignment.classes());
    dispatch(log, assignment.len(), |i| {
        let word = words.check_id(ids[i])?;
        words.check_id(classes[i])?;
        words.columns().class_id[word].store(classes[i], Ordering::Release);
        Ok(())
    })
}

/// Rewrite live pair endpoints to their classes.
///
/// Returns `(changed, eliminated)`. A pair whose endpoints map to the
/// same class is zeroed; other changed pairs are re-canonicalised and
/// marked dirty. The pair index is stale until `rebuild_pair_index`.
pub fn substitute_pairs(log: &DispatchLog, words: &WordPool, pairs: &PairPool) -> (usize, usize) {
    let changed = AtomicUsize::new(0);
    let eliminated = AtomicUsize::new(0);
    let classes = words.columns();
    let cols = pairs.columns();

    dispatch_infallible(log, pairs.len(), |slot| {
        if cols.count[slot].load() <= 0.0 {
            return;
        }
        let (a, b) = cols.endpoints(slot);
        let (ca, cb) = (classes.class_of(a), classes.class_of(b));
        if ca == a && cb == b {
            return;
        }
        changed.fetch_add(1, Ordering::Relaxed);

        let (lo, hi) = canonical(ca, cb);
        cols.word_a[slot].store(lo, Ordering::Release);
        cols.word_b[slot].store(hi, Ordering::Release);
        if lo == hi {
            cols.zero(slot);
            eliminated.fetch_add(1, Ordering::Relaxed);
        } else {
            cols.mark_dirty(slot);
        }
    });

    (changed.into_inner(), eliminated.into_inner())
}

/// Clear the pair index and re-insert every live pair.
///
/// The first slot to claim a key owns it; every other live slot with the
/// same key moves its count onto the owner and is zeroed. Returns the
/// number of slots merged away.
pub fn rebuild_pair_index(log: &DispatchLog, pairs: &mut PairPool) -> LexisResult<usize> {
    pairs.index_mut().clear();
    let pairs = &*pairs;
    let merged = AtomicUsize::new(0);
    let cols = pairs.columns();

    dispatch(log, pairs.len(), |slot| {
        if cols.count[slot].load() <= 0.0 {
            return Ok(());
        }
        let (a, b) = cols.endpoints(slot);
        let (owner, claimed) = pairs
            .index()
            .find_or_create(pair_key(a, b), || Ok(slot as u32))?;
        if claimed {
            return Ok(());
        }

        let owner = owner as usize;
        let moved = cols.count[slot].swap(0.0);
        cols.count[owner].fetch_add(moved);
        cols.mark_dirty(owner);
        cols.zero(slot);
        merged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;

    Ok(merged.into_inner())
}

/// Rewrite section words to their classes; returns sections changed.
///
/// Sections that become identical are not merged, and the section index
/// still holds their old keys.
pub fn substitute_section_words(
    log: &DispatchLog,
    words: &WordPool,
    sections: &SectionPool,
) -> usize {
    let changed = AtomicUsize::new(0);
    let classes = words.columns();
    let cols = sections.columns();

    dispatch_infallible(log, sections.len(), |slot| {
        let word = cols.word[slot].load(Ordering::Acquire);
        let class = classes.class_of(word);
        if class != word {
            cols.word[slot].store(class, Ordering::Release);
            changed.fetch_add(1, Ordering::Relaxed);
        }
    });

    changed.into_inner()
}

/// Recompute every word marginal from live pairs.
///
/// Each pair adds its count to both endpoints. Returns the total pair
/// mass, which becomes the new `N`.
pub fn rebuild_marginals(log: &DispatchLog, words: &WordPool, pairs: &PairPool) -> LexisResult<f64> {
    let marginals = &words.columns().count;
    dispatch_infallible(log, marginals.len(), |w| marginals[w].store(0.0));

    let mass = AtomicF64::new(0.0);
    let cols = pairs.columns();
    dispatch(log, pairs.len(), |slot| {
        let count = cols.count[slot].load();
        if count <= 0.0 {
            return Ok(());
        }
        let (a, b) = cols.endpoints(slot);
        let a = words.check_id(a)?;
        let b = words.check_id(b)?;
        marginals[a].fetch_add(count);
        marginals[b].fetch_add(count);
        mass.fetch_add(count);
        Ok(())
    })?;

    Ok(mass.load())
}
