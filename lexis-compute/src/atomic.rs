//! # Atomic f64
//!
//! There is no native atomic add for 64-bit floats, so the value is kept
//! as its bit pattern in an `AtomicU64`. `fetch_add` reads, adds, and
//! compare-and-swaps until no other work-item got in between.

use std::sync::atomic::{AtomicU64, Ordering};

/// A 64-bit float that supports lock-free accumulation
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Swap in `value`, returning the previous value
    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.bits.swap(value.to_bits(), Ordering::AcqRel))
    }

    /// Add `delta`, returning the previous value
    #[inline]
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Allocate `n` atomics holding `value`
pub(crate) fn f64_column(n: usize, value: f64) -> Box<[AtomicF64]> {
    (0..n).map(|_| AtomicF64::new(value)).collect()
}
