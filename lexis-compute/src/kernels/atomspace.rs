//! # Record Kernels
//!
//! Find-or-create entry points for the three record pools, plus the
//! by-index observation kernels.

use std::sync::atomic::{AtomicU64, Ordering};

use lexis_core::error::{LexisError, LexisResult};
use lexis_core::hash::{canonical, pair_key, safe_key, section_key};

use crate::kernels::dispatch::{dispatch, dispatch_map, DispatchLog};
use crate::pool::{PairPool, SectionPool, WordPool};

pub(crate) fn same_len(what: &str, a: usize, b: usize) -> LexisResult<()> {
    if a == b {
        Ok(())
    } else {
        Err(LexisError::malformed(format!(
            "{}: input lengths {} and {} differ",
            what, a, b
        )))
    }
}

/// One Word slot per name hash
pub fn word_find_or_create(
    log: &DispatchLog,
    words: &WordPool,
    hashes: &[u64],
) -> LexisResult<Vec<u32>> {
    dispatch_map(log, hashes.len(), |i| {
        let hash = safe_key(hashes[i]);
        let (slot, _) = words.find_or_create(hash, |cols, slot| {
            cols.name_hash[slot].store(hash, Ordering::Release);
        })?;
        Ok(slot)
    })
}

/// One Pair slot per `(a[i], b[i])`, stored canonically
pub fn pair_find_or_create(
    log: &DispatchLog,
    pairs: &PairPool,
    word_a: &[u32],
    word_b: &[u32],
) -> LexisResult<Vec<u32>> {
    same_len("pair_find_or_create", word_a.len(), word_b.len())?;
    dispatch_map(log, word_a.len(), |i| {
        find_or_create_pair(pairs, word_a[i], word_b[i]).map(|(slot, _)| slot)
    })
}

/// Shared by every stage that creates pairs
#[inline]
pub(crate) fn find_or_create_pair(pairs: &PairPool, a: u32, b: u32) -> LexisResult<(u32, bool)> {
    let (lo, hi) = canonical(a, b);
    pairs.find_or_create(pair_key(lo, hi), |cols, slot| {
        cols.word_a[slot].store(lo, Ordering::Relaxed);
        cols.word_b[slot].store(hi, Ordering::Relaxed);
    })
}

/// One Section slot per `(word[i], disjunct[i])`
pub fn section_find_or_create(
    log: &DispatchLog,
    sections: &SectionPool,
    words: &[u32],
    disjuncts: &[u64],
) -> LexisResult<Vec<u32>> {
    same_len("section_find_or_create", words.len(), disjuncts.len())?;
    dispatch_map(log, words.len(), |i| {
        find_or_create_section(sections, words[i], disjuncts[i]).map(|(slot, _)| slot)
    })
}

#[inline]
pub(crate) fn find_or_create_section(
    sections: &SectionPool,
    word: u32,
    disjunct: u64,
) -> LexisResult<(u32, bool)> {
    sections.find_or_create(section_key(word, disjunct), |cols, slot| {
        cols.word[slot].store(word, Ordering::Relaxed);
        cols.disjunct[slot].store(disjunct, Ordering::Relaxed);
    })
}

/// Add one observation to an existing pair and both of its words
#[inline]
pub(crate) fn observe_pair(words: &WordPool, pairs: &PairPool, slot: usize) -> LexisResult<()> {
    let cols = pairs.columns();
    let (a, b) = cols.endpoints(slot);
    let a = words.check_id(a)?;
    let b = words.check_id(b)?;
    cols.count[slot].fetch_add(1.0);
    cols.mark_dirty(slot);
    let marginals = &words.columns().count;
    marginals[a].fetch_add(1.0);
    marginals[b].fetch_add(1.0);
    Ok(())
}

/// Observe pairs by slot index; returns observations added to `N`
pub fn count_pairs(
    log: &DispatchLog,
    words: &WordPool,
    pairs: &PairPool,
    indices: &[u32],
    total_events: &AtomicU64,
) -> LexisResult<u64> {
    dispatch(log, indices.len(), |i| {
        let slot = pairs.check(indices[i])?;
        observe_pair(words, pairs, slot)?;
        total_events.fetch_add(1, Ordering::AcqRel);
        Ok(())
    })?;
    Ok(indices.len() as u64)
}

/// Observe sections by slot index
pub fn count_sections(
    log: &DispatchLog,
    sections: &SectionPool,
    indices: &[u32],
) -> LexisResult<()> {
    dispatch(log, indices.len(), |i| {
        let slot = sections.check(indices[i])?;
        sections.columns().count[slot].fetch_add(1.0);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_core::hash::word_hash;
    use lexis_core::soa::PairRecord;

    use crate::pool::Columns;

    fn pools() -> (DispatchLog, WordPool, PairPool, SectionPool) {
        (
            DispatchLog::default(),
            WordPool::new("word", 256, 512).unwrap(),
            PairPool::new("pair", 256, 512).unwrap(),
            SectionPool::new("section", 256, 512).unwrap(),
        )
    }

    const TEXT: &str = "the cat sat on the mat while a dog was sleeping near \
                        the door and it was a warm day";

    #[test]
    fn test_word_dedup() {
        let (log, words, _, _) = pools();
        let tokens: Vec<&str> = TEXT.split_whitespace().collect();
        assert_eq!(tokens.len(), 20);
        let hashes: Vec<u64> = tokens.iter().map(|t| word_hash(t)).collect();

        let out = word_find_or_create(&log, &words, &hashes).unwrap();
        assert_eq!(out[0], out[4]);
        assert_eq!(out[0], out[12]);
        assert_eq!(out[9], out[16]);
        assert_eq!(out[7], out[17]);
        assert_eq!(words.len(), 16);

        // Second pass creates nothing new
        let again = word_find_or_create(&log, &words, &hashes).unwrap();
        assert_eq!(out, again);
        assert_eq!(words.len(), 16);

        let rec = words.columns().record(out[0] as usize);
        assert_eq!(rec.name_hash, word_hash("the"));
    }

    #[test]
    fn test_pair_canonical_order() {
        let (log, _, pairs, _) = pools();
        let out = pair_find_or_create(&log, &pairs, &[7, 3, 7], &[3, 7, 9]).unwrap();
        assert_eq!(out[0], out[1]);
        assert_ne!(out[0], out[2]);
        assert_eq!(pairs.len(), 2);
        let rec = pairs.columns().record(out[0] as usize);
        assert_eq!((rec.word_a, rec.word_b), (3, 7));
    }

    #[test]
    fn test_pair_inputs_must_match() {
        let (log, _, pairs, _) = pools();
        let err = pair_find_or_create(&log, &pairs, &[1, 2], &[3]).unwrap_err();
        assert!(matches!(err, LexisError::MalformedBatch(_)));
    }

    #[test]
    fn test_section_identity_includes_word() {
        let (log, _, _, sections) = pools();
        let out = section_find_or_create(
            &log,
            &sections,
            &[1, 2, 1, 1],
            &[0x222, 0x222, 0x222, 0x333],
        )
        .unwrap();
        assert_ne!(out[0], out[1]);
        assert_eq!(out[0], out[2]);
        assert_ne!(out[0], out[3]);
        assert_eq!(sections.len(), 3);
    }

    #[test]
    fn test_count_pairs_by_index() {
        let (log, words, pairs, _) = pools();
        let total = AtomicU64::new(0);
        let out = pair_find_or_create(&log, &pairs, &[4], &[2]).unwrap();
        let indices = vec![out[0]; 100];

        assert_eq!(count_pairs(&log, &words, &pairs, &indices, &total).unwrap(), 100);
        let rec = pairs.columns().record(out[0] as usize);
        assert_eq!(rec.count, 100.0);
        assert_eq!(rec.flags & PairRecord::DIRTY, PairRecord::DIRTY);
        assert_eq!(words.columns().count[2].load(), 100.0);
        assert_eq!(words.columns().count[4].load(), 100.0);
        assert_eq!(total.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_count_pairs_rejects_unknown_slot() {
        let (log, words, pairs, _) = pools();
        let total = AtomicU64::new(0);
        assert!(count_pairs(&log, &words, &pairs, &[0], &total).is_err());
    }

    #[test]
    fn test_count_sections_by_index() {
        let (log, _, _, sections) = pools();
        let out = section_find_or_create(&log, &sections, &[5], &[0x10]).unwrap();
        count_sections(&log, &sections, &vec![out[0]; 50]).unwrap();
        assert_eq!(sections.columns().count[out[0] as usize].load(), 50.0);
    }
}
