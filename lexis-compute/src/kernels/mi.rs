//! # Mutual Information
//!
//! `MI(a, b) = log2(count * N / (marginal(a) * marginal(b)))`
//!
//! Zero whenever the count, either marginal or `N` is not strictly
//! positive, so no NaN or infinity ever reaches the pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use lexis_core::soa::MiHit;

use crate::kernels::dispatch::{dispatch_infallible, Compactor, DispatchLog};
use crate::pool::{PairPool, WordPool};

/// Pointwise mutual information of one pair
#[inline]
pub fn mi_value(count: f64, n: f64, marginal_a: f64, marginal_b: f64) -> f64 {
    if count > 0.0 && n > 0.0 && marginal_a > 0.0 && marginal_b > 0.0 {
        (count * n / (marginal_a * marginal_b)).log2()
    } else {
        0.0
    }
}

#[inline]
fn marginal(words: &WordPool, word: u32) -> f64 {
    words
        .columns()
        .count
        .get(word as usize)
        .map_or(0.0, |m| m.load())
}

#[inline]
fn recompute(words: &WordPool, pairs: &PairPool, slot: usize, n: f64) {
    let cols = pairs.columns();
    let (a, b) = cols.endpoints(slot);
    let mi = mi_value(cols.count[slot].load(), n, marginal(words, a), marginal(words, b));
    cols.mi[slot].store(mi);
}

/// Recompute MI for every pair; dirty flags are left alone
pub fn compute_mi_all(log: &DispatchLog, words: &WordPool, pairs: &PairPool, n: f64) -> usize {
    let num = pairs.len();
    dispatch_infallible(log, num, |slot| recompute(words, pairs, slot, n));
    num
}

/// Recompute MI for dirty pairs only, clearing their flag.
///
/// Returns how many pairs were recomputed.
pub fn compute_mi_dirty(log: &DispatchLog, words: &WordPool, pairs: &PairPool, n: f64) -> usize {
    let touched = AtomicUsize::new(0);
    dispatch_infallible(log, pairs.len(), |slot| {
        if pairs.columns().take_dirty(slot) {
            recompute(words, pairs, slot, n);
            touched.fetch_add(1, Ordering::Relaxed);
        }
    });
    touched.into_inner()
}

/// Live-pair tallies: `(count > 0, mi > 0, mi > threshold)`
pub fn mi_stats(log: &DispatchLog, pairs: &PairPool, threshold: f64) -> (usize, usize, usize) {
    let nonzero = AtomicUsize::new(0);
    let positive = AtomicUsize::new(0);
    let above = AtomicUsize::new(0);
    let cols = pairs.columns();

    dispatch_infallible(log, pairs.len(), |slot| {
        if cols.count[slot].load() <= 0.0 {
            return;
        }
        nonzero.fetch_add(1, Ordering::Relaxed);
        let mi = cols.mi[slot].load();
        if mi > 0.0 {
            positive.fetch_add(1, Ordering::Relaxed);
        }
        if mi > threshold {
            above.fetch_add(1, Ordering::Relaxed);
        }
    });

    (nonzero.into_inner(), positive.into_inner(), above.into_inner())
}

/// Live pairs whose MI exceeds `threshold`, at most `max_out` of them.
///
/// Returns the emitted hits and the total number of matches.
pub fn mi_filter(
    log: &DispatchLog,
    pairs: &PairPool,
    threshold: f64,
    max_out: usize,
) -> (Vec<MiHit>, usize) {
    let num = pairs.len();
    let out = Compactor::new(max_out, num);
    let cols = pairs.columns();

    dispatch_infallible(log, num, |slot| {
        let mi = cols.mi[slot].load();
        if mi > threshold && cols.count[slot].load() > 0.0 {
            out.push(MiHit {
                mi,
                pair: slot as u32,
                _pad: 0,
            });
        }
    });

    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::atomspace::pair_find_or_create;

    fn setup() -> (DispatchLog, WordPool, PairPool) {
        (
            DispatchLog::default(),
            WordPool::new("word", 64, 128).unwrap(),
            PairPool::new("pair", 64, 128).unwrap(),
        )
    }

    /// Pairs (0,1):10, (0,2):5, (1,3):20; marginals 30, 40, 20, 50
    fn load_manual(log: &DispatchLog, words: &WordPool, pairs: &PairPool) -> Vec<u32> {
        let slots = pair_find_or_create(log, pairs, &[0, 0, 1], &[1, 2, 3]).unwrap();
        for (&slot, count) in slots.iter().zip([10.0, 5.0, 20.0]) {
            pairs.columns().count[slot as usize].store(count);
        }
        for (w, m) in [30.0, 40.0, 20.0, 50.0].into_iter().enumerate() {
            words.columns().count[w].store(m);
        }
        slots
    }

    #[test]
    fn test_mi_value_degenerate_inputs() {
        assert_eq!(mi_value(0.0, 100.0, 1.0, 1.0), 0.0);
        assert_eq!(mi_value(1.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(mi_value(1.0, 100.0, 0.0, 1.0), 0.0);
        assert_eq!(mi_value(1.0, 100.0, 1.0, -2.0), 0.0);
        assert_eq!(mi_value(4.0, 4.0, 2.0, 2.0), 2.0);
    }

    #[test]
    fn test_manual_mi_matches_formula() {
        let (log, words, pairs) = setup();
        let slots = load_manual(&log, &words, &pairs);
        assert_eq!(compute_mi_all(&log, &words, &pairs, 100.0), 3);

        let expected = [
            (10.0f64 * 100.0 / (30.0 * 40.0)).log2(),
            (5.0f64 * 100.0 / (30.0 * 20.0)).log2(),
            (20.0f64 * 100.0 / (40.0 * 50.0)).log2(),
        ];
        for (&slot, want) in slots.iter().zip(expected) {
            let got = pairs.columns().mi[slot as usize].load();
            assert!((got - want).abs() < 1e-3, "got {} want {}", got, want);
        }
    }

    #[test]
    fn test_dirty_only_touches_flagged_pairs() {
        let (log, words, pairs) = setup();
        let slots = load_manual(&log, &words, &pairs);
        let cols = pairs.columns();
        cols.mark_dirty(slots[1] as usize);
        cols.mi[slots[0] as usize].store(42.0);

        assert_eq!(compute_mi_dirty(&log, &words, &pairs, 100.0), 1);
        assert_eq!(cols.mi[slots[0] as usize].load(), 42.0);
        assert!(cols.mi[slots[1] as usize].load() != 0.0);
        assert!(!cols.take_dirty(slots[1] as usize));

        // Nothing left to do
        assert_eq!(compute_mi_dirty(&log, &words, &pairs, 100.0), 0);
    }

    #[test]
    fn test_stats_and_filter_agree() {
        let (log, words, pairs) = setup();
        load_manual(&log, &words, &pairs);
        compute_mi_all(&log, &words, &pairs, 100.0);

        // MIs: log2(1000/1200) ~ -0.263, log2(500/600) ~ -0.263, log2(2000/2000) = 0
        let (nonzero, positive, above) = mi_stats(&log, &pairs, -0.1);
        assert_eq!(nonzero, 3);
        assert_eq!(positive, 0);
        assert_eq!(above, 1);

        let (hits, total) = mi_filter(&log, &pairs, -0.1, 10);
        assert_eq!(hits.len(), above);
        assert_eq!(total, above);
        assert!(hits.iter().all(|h| h.mi > -0.1));

        let (_, _, above) = mi_stats(&log, &pairs, -0.3);
        assert_eq!(above, 3);
    }

    #[test]
    fn test_filter_respects_bound() {
        let (log, words, pairs) = setup();
        load_manual(&log, &words, &pairs);
        compute_mi_all(&log, &words, &pairs, 100.0);

        let (hits, total) = mi_filter(&log, &pairs, -10.0, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_filter_without_bound_returns_every_match() {
        let (log, words, pairs) = setup();
        let (hits, total) = mi_filter(&log, &pairs, 0.0, usize::MAX);
        assert!(hits.is_empty());
        assert_eq!(total, 0);

        load_manual(&log, &words, &pairs);
        compute_mi_all(&log, &words, &pairs, 100.0);
        let (hits, total) = mi_filter(&log, &pairs, -10.0, usize::MAX);
        assert_eq!(total, 3);
        let mut emitted: Vec<u32> = hits.iter().map(|h| h.pair).collect();
        emitted.sort_unstable();
        assert_eq!(emitted, vec![0, 1, 2]);
    }

    #[test]
    fn test_dead_pairs_do_not_pass_filter() {
        let (log, words, pairs) = setup();
        let slots = load_manual(&log, &words, &pairs);
        pairs.columns().mi[slots[2] as usize].store(5.0);
        pairs.columns().count[slots[2] as usize].store(0.0);

        let (hits, total) = mi_filter(&log, &pairs, 1.0, 10);
        assert!(hits.is_empty());
        assert_eq!(total, 0);
    }
}
