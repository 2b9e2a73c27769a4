//! # Sentence-Window Counting
//!
//! One work-item per flat word position `i`. The work-item finds the
//! sentence that owns `i`, then observes the pair `(token[i], token[j])`
//! for every `j` in `(i, i + window]` that is still inside that sentence.
//!
//! Two ways to find the owning sentence:
//! - **Linear**: walk sentence boundaries from the front
//! - **Binary search**: bisect the (sorted) sentence offsets
//!
//! Both produce the same pairs and counts.

use std::sync::atomic::{AtomicU64, Ordering};

use lexis_core::batch::SentenceBatch;
use lexis_core::error::{LexisError, LexisResult};

use crate::kernels::atomspace::{find_or_create_pair, observe_pair};
use crate::kernels::dispatch::{dispatch, DispatchLog};
use crate::pool::{PairPool, WordPool};

/// How a work-item finds the sentence that owns its position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentenceLocator {
    Linear,
    BinarySearch,
}

impl SentenceLocator {
    /// Index of the sentence containing flat position `pos`
    #[inline]
    pub fn locate(self, batch: &SentenceBatch, pos: u32) -> Option<usize> {
        let offsets = batch.offsets();
        let lengths = batch.lengths();
        match self {
            SentenceLocator::Linear => {
                (0..offsets.len()).find(|&s| pos >= offsets[s] && pos < offsets[s] + lengths[s])
            }
            SentenceLocator::BinarySearch => {
                // Last sentence starting at or before pos; empty sentences
                // sharing that offset sort before the one that owns it
                let s = offsets.partition_point(|&off| off <= pos).checked_sub(1)?;
                (pos < offsets[s] + lengths[s]).then_some(s)
            }
        }
    }
}

/// Count every within-window pair of the batch.
///
/// Returns the number of pair observations, which are also added to
/// `total_events`. Each work-item adds its own observations, so after an
/// overflow `N` still equals the pair mass that was counted.
pub fn count_sentence_pairs(
    log: &DispatchLog,
    batch: &SentenceBatch,
    window: u32,
    locator: SentenceLocator,
    words: &WordPool,
    pairs: &PairPool,
    total_events: &AtomicU64,
) -> LexisResult<u64> {
    let flat = batch.words();
    let events = AtomicU64::new(0);

    dispatch(log, flat.len(), |i| {
        let pos = i as u32;
        let s = locator.locate(batch, pos).ok_or_else(|| {
            LexisError::malformed(format!("position {} belongs to no sentence", pos))
        })?;
        let end = batch.offsets()[s] + batch.lengths()[s];
        let last = pos.saturating_add(window).min(end - 1);

        // Observations made before a failure still count toward `N`
        let mut observed = 0u64;
        let mut outcome = Ok(());
        for j in (pos + 1)..=last {
            if let Err(e) = find_or_create_pair(pairs, flat[i], flat[j as usize])
                .and_then(|(slot, _)| observe_pair(words, pairs, slot as usize))
            {
                outcome = Err(e);
                break;
            }
            observed += 1;
        }
        if observed > 0 {
            events.fetch_add(observed, Ordering::AcqRel);
            total_events.fetch_add(observed, Ordering::AcqRel);
        }
        outcome
    })?;

    Ok(events.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_core::hash::pair_key;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    struct Fixture {
        log: DispatchLog,
        words: WordPool,
        pairs: PairPool,
        total: AtomicU64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: DispatchLog::default(),
                words: WordPool::new("word", 1024, 2048).unwrap(),
                pairs: PairPool::new("pair", 1 << 15, 1 << 16).unwrap(),
                total: AtomicU64::new(0),
            }
        }

        fn count(&self, batch: &SentenceBatch, window: u32, locator: SentenceLocator) -> u64 {
            count_sentence_pairs(
                &self.log,
                batch,
                window,
                locator,
                &self.words,
                &self.pairs,
                &self.total,
            )
            .unwrap()
        }

        fn pair_map(&self) -> BTreeMap<(u32, u32), f64> {
            self.pairs
                .read_all()
                .into_iter()
                .map(|p| ((p.word_a, p.word_b), p.count))
                .collect()
        }

        fn marginal(&self, w: usize) -> f64 {
            self.words.columns().count[w].load()
        }
    }

    #[test]
    fn test_single_sentence_window_two() {
        let fx = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![0, 1, 2, 3]]).unwrap();
        assert_eq!(fx.count(&batch, 2, SentenceLocator::Linear), 5);

        let pairs = fx.pair_map();
        let expected: Vec<(u32, u32)> = vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)];
        assert_eq!(pairs.keys().copied().collect::<Vec<_>>(), expected);
        assert!(pairs.values().all(|&c| c == 1.0));
        assert_eq!(fx.total.load(Ordering::Relaxed), 5);

        let marginals: Vec<f64> = (0..4).map(|w| fx.marginal(w)).collect();
        assert_eq!(marginals, vec![2.0, 3.0, 3.0, 2.0]);
    }

    #[test]
    fn test_no_pairs_cross_sentences() {
        let fx = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![0, 1, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(fx.count(&batch, 2, SentenceLocator::Linear), 8);

        for (a, b) in fx.pair_map().keys() {
            assert_eq!(*a < 4, *b < 4, "pair ({}, {}) spans sentences", a, b);
        }
    }

    #[test]
    fn test_readback_invariants() {
        let fx = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![9, 3, 5, 3, 1], vec![2, 8]]).unwrap();
        let events = fx.count(&batch, 3, SentenceLocator::Linear);

        let rows = fx.pairs.read_all();
        let sum: f64 = rows.iter().map(|p| p.count).sum();
        assert_eq!(sum, events as f64);
        for p in rows {
            assert!(p.count > 0.0);
            assert!(p.is_dirty());
            assert!(p.word_a <= p.word_b);
        }
    }

    #[test]
    fn test_binary_search_matches_linear_small() {
        let linear = Fixture::new();
        let binary = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![0, 1, 2, 3], vec![4, 5, 6]]).unwrap();
        linear.count(&batch, 2, SentenceLocator::Linear);
        binary.count(&batch, 2, SentenceLocator::BinarySearch);

        assert_eq!(linear.pair_map(), binary.pair_map());
        let marginals: Vec<f64> = (0..7).map(|w| binary.marginal(w)).collect();
        assert_eq!(marginals, vec![2.0, 3.0, 3.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_binary_search_matches_linear_random_corpus() {
        let mut rng = StdRng::seed_from_u64(7);
        let sentences: Vec<Vec<u32>> = (0..1000)
            .map(|_| {
                let len = rng.gen_range(0..15);
                (0..len).map(|_| rng.gen_range(0..200)).collect()
            })
            .collect();
        let batch = SentenceBatch::from_sentences(&sentences).unwrap();

        let linear = Fixture::new();
        let binary = Fixture::new();
        let a = linear.count(&batch, 4, SentenceLocator::Linear);
        let b = binary.count(&batch, 4, SentenceLocator::BinarySearch);
        assert_eq!(a, b);
        assert_eq!(linear.pair_map(), binary.pair_map());
        for w in 0..200 {
            assert_eq!(linear.marginal(w), binary.marginal(w));
        }
    }

    #[test]
    fn test_repeated_word_counts_self_pair() {
        let fx = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![3, 3]]).unwrap();
        assert_eq!(fx.count(&batch, 1, SentenceLocator::BinarySearch), 1);
        assert!(fx.pairs.lookup(pair_key(3, 3)).is_some());
        assert_eq!(fx.marginal(3), 2.0);
    }

    #[test]
    fn test_locator_skips_empty_sentences() {
        let batch = SentenceBatch::from_sentences(&[vec![1, 2], vec![], vec![3], vec![]]).unwrap();
        for locator in [SentenceLocator::Linear, SentenceLocator::BinarySearch] {
            assert_eq!(locator.locate(&batch, 0), Some(0));
            assert_eq!(locator.locate(&batch, 1), Some(0));
            assert_eq!(locator.locate(&batch, 2), Some(2));
            assert_eq!(locator.locate(&batch, 3), None);
        }
    }

    #[test]
    fn test_overflow_keeps_total_in_step_with_pairs() {
        let fx = Fixture {
            pairs: PairPool::new("pair", 8, 16).unwrap(),
            ..Fixture::new()
        };
        let sentence: Vec<u32> = (0..20).collect();
        let batch = SentenceBatch::from_sentences(&[sentence]).unwrap();
        let err = count_sentence_pairs(
            &fx.log,
            &batch,
            5,
            SentenceLocator::Linear,
            &fx.words,
            &fx.pairs,
            &fx.total,
        )
        .unwrap_err();
        assert!(err.is_overflow());

        let mass: f64 = fx.pairs.read_all().iter().map(|p| p.count).sum();
        assert!(mass > 0.0);
        assert_eq!(fx.total.load(Ordering::Relaxed) as f64, mass);
        let marginals: f64 = (0..20).map(|w| fx.marginal(w)).sum();
        assert_eq!(marginals, 2.0 * mass);
    }

    #[test]
    fn test_word_beyond_capacity_is_rejected() {
        let fx = Fixture::new();
        let batch = SentenceBatch::from_sentences(&[vec![1, 5000]]).unwrap();
        let err = count_sentence_pairs(
            &fx.log,
            &batch,
            2,
            SentenceLocator::Linear,
            &fx.words,
            &fx.pairs,
            &fx.total,
        )
        .unwrap_err();
        assert!(matches!(err, LexisError::MalformedBatch(_)));
    }
}
