//! # Dispatch
//!
//! A dispatch runs one closure per work-item index across the current
//! Rayon pool and returns once every work-item is done. Nothing orders
//! work-items within a dispatch; the return is the barrier between
//! stages.
//!
//! `Compactor` mirrors the GPU output-cursor pattern: each hit takes the
//! next position from an atomic counter and only positions inside the
//! bound are written.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::prelude::*;

use lexis_core::error::LexisResult;

/// Dispatch counters shared by every kernel of one store
#[derive(Debug, Default)]
pub struct DispatchLog {
    dispatches: AtomicU64,
    work_items: AtomicU64,
    overflows: AtomicU64,
}

impl DispatchLog {
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn work_items(&self) -> u64 {
        self.work_items.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    fn record(&self, n: usize) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        self.work_items.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn observe<T>(&self, n: usize, result: LexisResult<T>) -> LexisResult<T> {
        if let Err(e) = &result {
            if e.is_overflow() {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("dispatch of {} work-items overflowed: {}", n, e);
            }
        }
        result
    }
}

/// Run `kernel(i)` for every `i` in `0..n`.
///
/// The first error stops new work-items from starting and is returned;
/// work-items already running finish normally.
pub fn dispatch<F>(log: &DispatchLog, n: usize, kernel: F) -> LexisResult<()>
where
    F: Fn(usize) -> LexisResult<()> + Send + Sync,
{
    log.record(n);
    log.observe(n, (0..n).into_par_iter().try_for_each(kernel))
}

/// Run `kernel(i)` for every `i` in `0..n`, collecting one output per work-item
pub fn dispatch_map<T, F>(log: &DispatchLog, n: usize, kernel: F) -> LexisResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> LexisResult<T> + Send + Sync,
{
    log.record(n);
    log.observe(n, (0..n).into_par_iter().map(kernel).collect())
}

/// Run `kernel(i)` for every `i` in `0..n` where the kernel cannot fail
pub fn dispatch_infallible<F>(log: &DispatchLog, n: usize, kernel: F)
where
    F: Fn(usize) + Send + Sync,
{
    log.record(n);
    (0..n).into_par_iter().for_each(kernel);
}

/// Bounded output buffer filled through an atomic cursor
pub struct Compactor<T> {
    cursor: AtomicUsize,
    slots: Box<[OnceLock<T>]>,
}

impl<T: Send + Sync> Compactor<T> {
    /// Room for `max_out` rows from a dispatch of `work_items`.
    ///
    /// Each work-item pushes at most once, so no more than `work_items`
    /// slots are ever allocated.
    pub fn new(max_out: usize, work_items: usize) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            slots: (0..max_out.min(work_items)).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Claim the next position; rows past the bound are dropped
    #[inline]
    pub fn push(&self, row: T) {
        let pos = self.cursor.fetch_add(1, Ordering::AcqRel);
        if let Some(slot) = self.slots.get(pos) {
            // Each position is claimed by exactly one caller
            let _ = slot.set(row);
        }
    }

    /// Emitted rows in cursor order, plus the number of pushes
    pub fn finish(self) -> (Vec<T>, usize) {
        let total = self.cursor.into_inner();
        let rows = self
            .slots
            .into_vec()
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();
        (rows, total)
    }
}
