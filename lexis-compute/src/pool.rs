//! # Record Pools
//!
//! A pool is a fixed arena of record slots stored column by column, a
//! bump allocator handing out fresh slots, and a hash index from content
//! key to slot. Records are addressed by slot index, never by reference.
//!
//! The allocator only runs inside the find-or-create winner, so a race
//! on the same key never burns a slot.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use rayon::prelude::*;

use lexis_core::error::{LexisError, LexisResult};
use lexis_core::soa::{CandidateRecord, PairRecord, SectionRecord, WordRecord};
use lexis_core::{NOT_FOUND, NO_CLASS};

use crate::atomic::{f64_column, AtomicF64};
use crate::hashtable::ConcurrentHashIndex;

/// Saturating atomic slot counter
#[derive(Debug)]
pub struct BumpAllocator {
    next: AtomicUsize,
    capacity: usize,
}

impl BumpAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Hand out the next free slot, or `None` once the arena is full
    #[inline]
    pub fn allocate(&self) -> Option<usize> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
    }

    /// Slots handed out so far
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        *self.next.get_mut() = 0;
    }
}

/// Column storage for one record type
pub trait Columns: Send + Sync + Sized {
    /// Packed row returned by readbacks
    type Record: Send;

    fn with_capacity(capacity: usize) -> Self;

    /// Restore every slot to its initial value
    fn reset(&mut self);

    fn record(&self, slot: usize) -> Self::Record;
}

/// Fixed arena + allocator + content index
pub struct RecordPool<C: Columns> {
    name: &'static str,
    columns: C,
    allocator: BumpAllocator,
    index: ConcurrentHashIndex,
}

impl<C: Columns> RecordPool<C> {
    pub fn new(name: &'static str, capacity: usize, index_capacity: usize) -> LexisResult<Self> {
        if capacity == 0 || capacity > index_capacity {
            return Err(LexisError::config(format!(
                "{} pool capacity {} must be in 1..={}",
                name, capacity, index_capacity
            )));
        }
        Ok(Self {
            name,
            columns: C::with_capacity(capacity),
            allocator: BumpAllocator::new(capacity),
            index: ConcurrentHashIndex::new(name, index_capacity)?,
        })
    }

    /// Slot for `key`, running `init` on a fresh slot before it is published.
    ///
    /// Returns `(slot, created)`.
    #[inline]
    pub fn find_or_create<F>(&self, key: u64, init: F) -> LexisResult<(u32, bool)>
    where
        F: FnOnce(&C, usize),
    {
        self.index.find_or_create(key, || {
            let slot = self
                .allocator
                .allocate()
                .ok_or_else(|| LexisError::overflow(self.name, self.allocator.capacity()))?;
            init(&self.columns, slot);
            Ok(slot as u32)
        })
    }

    /// Slot for `key`, if present
    pub fn lookup(&self, key: u64) -> Option<u32> {
        match self.index.lookup(key) {
            NOT_FOUND => None,
            slot => Some(slot),
        }
    }

    /// Reject a slot index that was never allocated
    #[inline]
    pub fn check(&self, slot: u32) -> LexisResult<usize> {
        let slot = slot as usize;
        if slot < self.len() {
            Ok(slot)
        } else {
            Err(LexisError::malformed(format!(
                "{} slot {} out of range ({} live)",
                self.name,
                slot,
                self.len()
            )))
        }
    }

    /// Reject an id beyond the arena, allocated or not
    #[inline]
    pub fn check_id(&self, id: u32) -> LexisResult<usize> {
        let id = id as usize;
        if id < self.capacity() {
            Ok(id)
        } else {
            Err(LexisError::malformed(format!(
                "{} id {} beyond capacity {}",
                self.name,
                id,
                self.capacity()
            )))
        }
    }

    pub fn columns(&self) -> &C {
        &self.columns
    }

    pub fn index(&self) -> &ConcurrentHashIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut ConcurrentHashIndex {
        &mut self.index
    }

    /// Live slots
    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pack every live slot into rows
    pub fn read_all(&self) -> Vec<C::Record> {
        (0..self.len())
            .into_par_iter()
            .map(|slot| self.columns.record(slot))
            .collect()
    }

    /// Empty the pool: columns, allocator and index
    pub fn reset(&mut self) {
        self.columns.reset();
        self.allocator.reset();
        self.index.clear();
    }
}

fn u32_column(n: usize, value: u32) -> Box<[AtomicU32]> {
    (0..n).map(|_| AtomicU32::new(value)).collect()
}

fn u64_column(n: usize) -> Box<[AtomicU64]> {
    (0..n).map(|_| AtomicU64::new(0)).collect()
}

fn fill_u32(col: &mut [AtomicU32], value: u32) {
    col.par_iter_mut().for_each(|c| *c.get_mut() = value);
}

fn fill_u64(col: &mut [AtomicU64]) {
    col.par_iter_mut().for_each(|c| *c.get_mut() = 0);
}

fn fill_f64(col: &mut [AtomicF64]) {
    col.par_iter_mut().for_each(|c| c.store(0.0));
}

/// Word columns, indexed by word id.
///
/// `count` doubles as the word's marginal. Word ids used by batches are
/// checked against capacity, not against live slots, so marginals and
/// class ids exist for every id in range.
pub struct WordColumns {
    pub name_hash: Box<[AtomicU64]>,
    pub count: Box<[AtomicF64]>,
    pub class_id: Box<[AtomicU32]>,
}

impl Columns for WordColumns {
    type Record = WordRecord;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            name_hash: u64_column(capacity),
            count: f64_column(capacity, 0.0),
            class_id: u32_column(capacity, NO_CLASS),
        }
    }

    fn reset(&mut self) {
        fill_u64(&mut self.name_hash);
        fill_f64(&mut self.count);
        fill_u32(&mut self.class_id, NO_CLASS);
    }

    fn record(&self, slot: usize) -> WordRecord {
        WordRecord {
            name_hash: self.name_hash[slot].load(Ordering::Acquire),
            count: self.count[slot].load(),
            class_id: self.class_id[slot].load(Ordering::Acquire),
            _pad: 0,
        }
    }
}

impl WordColumns {
    /// Class a word maps to (itself when unassigned or out of range)
    #[inline]
    pub fn class_of(&self, word: u32) -> u32 {
        match self.class_id.get(word as usize).map(|c| c.load(Ordering::Acquire)) {
            Some(NO_CLASS) | None => word,
            Some(class) => class,
        }
    }
}

pub struct PairColumns {
    pub word_a: Box<[AtomicU32]>,
    pub word_b: Box<[AtomicU32]>,
    pub count: Box<[AtomicF64]>,
    pub mi: Box<[AtomicF64]>,
    pub flags: Box<[AtomicU32]>,
}

impl Columns for PairColumns {
    type Record = PairRecord;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            word_a: u32_column(capacity, 0),
            word_b: u32_column(capacity, 0),
            count: f64_column(capacity, 0.0),
            mi: f64_column(capacity, 0.0),
            flags: u32_column(capacity, 0),
        }
    }

    fn reset(&mut self) {
        fill_u32(&mut self.word_a, 0);
        fill_u32(&mut self.word_b, 0);
        fill_f64(&mut self.count);
        fill_f64(&mut self.mi);
        fill_u32(&mut self.flags, 0);
    }

    fn record(&self, slot: usize) -> PairRecord {
        PairRecord {
            count: self.count[slot].load(),
            mi: self.mi[slot].load(),
            word_a: self.word_a[slot].load(Ordering::Acquire),
            word_b: self.word_b[slot].load(Ordering::Acquire),
            flags: self.flags[slot].load(Ordering::Acquire),
            _pad: 0,
        }
    }
}

impl PairColumns {
    #[inline]
    pub fn mark_dirty(&self, slot: usize) {
        self.flags[slot].fetch_or(PairRecord::DIRTY, Ordering::AcqRel);
    }

    /// Clear the dirty flag, returning whether it was set
    #[inline]
    pub fn take_dirty(&self, slot: usize) -> bool {
        self.flags[slot].fetch_and(!PairRecord::DIRTY, Ordering::AcqRel) & PairRecord::DIRTY != 0
    }

    #[inline]
    pub fn endpoints(&self, slot: usize) -> (u32, u32) {
        (
            self.word_a[slot].load(Ordering::Acquire),
            self.word_b[slot].load(Ordering::Acquire),
        )
    }

    /// Zero count and MI and clear flags
    #[inline]
    pub fn zero(&self, slot: usize) {
        self.count[slot].store(0.0);
        self.mi[slot].store(0.0);
        self.flags[slot].store(0, Ordering::Release);
    }
}

pub struct SectionColumns {
    pub word: Box<[AtomicU32]>,
    pub disjunct: Box<[AtomicU64]>,
    pub count: Box<[AtomicF64]>,
}

impl Columns for SectionColumns {
    type Record = SectionRecord;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            word: u32_column(capacity, 0),
            disjunct: u64_column(capacity),
            count: f64_column(capacity, 0.0),
        }
    }

    fn reset(&mut self) {
        fill_u32(&mut self.word, 0);
        fill_u64(&mut self.disjunct);
        fill_f64(&mut self.count);
    }

    fn record(&self, slot: usize) -> SectionRecord {
        SectionRecord {
            disjunct_hash: self.disjunct[slot].load(Ordering::Acquire),
            count: self.count[slot].load(),
            word: self.word[slot].load(Ordering::Acquire),
            _pad: 0,
        }
    }
}

pub struct CandidateColumns {
    pub word_a: Box<[AtomicU32]>,
    pub word_b: Box<[AtomicU32]>,
    pub dot: Box<[AtomicF64]>,
    pub cosine: Box<[AtomicF64]>,
}

impl Columns for CandidateColumns {
    type Record = CandidateRecord;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            word_a: u32_column(capacity, 0),
            word_b: u32_column(capacity, 0),
            dot: f64_column(capacity, 0.0),
            cosine: f64_column(capacity, 0.0),
        }
    }

    fn reset(&mut self) {
        fill_u32(&mut self.word_a, 0);
        fill_u32(&mut self.word_b, 0);
        fill_f64(&mut self.dot);
        fill_f64(&mut self.cosine);
    }

    fn record(&self, slot: usize) -> CandidateRecord {
        CandidateRecord {
            dot: self.dot[slot].load(),
            cosine: self.cosine[slot].load(),
            word_a: self.word_a[slot].load(Ordering::Acquire),
            word_b: self.word_b[slot].load(Ordering::Acquire),
        }
    }
}

pub type WordPool = RecordPool<WordColumns>;
pub type PairPool = RecordPool<PairColumns>;
pub type SectionPool = RecordPool<SectionColumns>;
pub type CandidatePool = RecordPool<CandidateColumns>;
