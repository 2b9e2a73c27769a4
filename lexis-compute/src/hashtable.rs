//! # Concurrent Hash Index
//!
//! Fixed-capacity open addressing map from a 64-bit key to a 32-bit value.
//! Keys and values live in two parallel atomic arrays; linear probing
//! starts at `key & (capacity - 1)` and visits at most `capacity` slots.
//!
//! ## Slot lifecycle
//!
//! ```text
//! EMPTY ──CAS──▶ key (value EMPTY) ──store──▶ key (value) ──delete──▶ TOMBSTONE
//! ```
//!
//! A slot is claimed by exactly one caller (the CAS winner). Callers that
//! lose the race on the same key spin until the winner publishes the
//! value. Tombstones are never reclaimed by inserts; `clear` resets them.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use rayon::prelude::*;

use lexis_core::error::{LexisError, LexisResult};
use lexis_core::hash::safe_key;
use lexis_core::{EMPTY_KEY, EMPTY_VALUE, NOT_FOUND, OVERFLOW_VALUE, TOMBSTONE_KEY};

/// Lock-free key → value index
pub struct ConcurrentHashIndex {
    /// Name used in overflow errors
    name: &'static str,
    keys: Box<[AtomicU64]>,
    values: Box<[AtomicU32]>,
    mask: usize,
}

impl ConcurrentHashIndex {
    /// Create an empty index; `capacity` must be a power of two
    pub fn new(name: &'static str, capacity: usize) -> LexisResult<Self> {
        if !capacity.is_power_of_two() {
            return Err(LexisError::config(format!(
                "{} capacity {} is not a power of two",
                name, capacity
            )));
        }
        Ok(Self {
            name,
            keys: (0..capacity).map(|_| AtomicU64::new(EMPTY_KEY)).collect(),
            values: (0..capacity).map(|_| AtomicU32::new(EMPTY_VALUE)).collect(),
            mask: capacity - 1,
        })
    }

    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn probe(&self, key: u64) -> impl Iterator<Item = usize> {
        let start = key as usize & self.mask;
        let mask = self.mask;
        (0..=mask).map(move |step| (start + step) & mask)
    }

    fn overflow(&self) -> LexisError {
        LexisError::overflow(self.name, self.capacity())
    }

    /// Wait for the claiming caller to publish the slot's value
    #[inline]
    fn await_value(&self, slot: usize) -> LexisResult<u32> {
        loop {
            match self.values[slot].load(Ordering::Acquire) {
                EMPTY_VALUE => spin_loop(),
                OVERFLOW_VALUE => return Err(self.overflow()),
                v => return Ok(v),
            }
        }
    }

    /// Find the slot holding `key`, claiming the first empty one if absent.
    ///
    /// Returns `(slot, claimed)`.
    #[inline]
    fn claim(&self, key: u64) -> LexisResult<(usize, bool)> {
        for slot in self.probe(key) {
            let current = self.keys[slot].load(Ordering::Acquire);
            if current == key {
                return Ok((slot, false));
            }
            if current != EMPTY_KEY {
                continue;
            }
            match self.keys[slot].compare_exchange(
                EMPTY_KEY,
                key,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok((slot, true)),
                Err(actual) if actual == key => return Ok((slot, false)),
                Err(_) => continue,
            }
        }
        Err(self.overflow())
    }

    /// Return the value stored for `key`, creating it with `allocate` if absent.
    ///
    /// `allocate` runs only in the caller that claims the slot. If it fails,
    /// the slot is marked overflowed so racing callers fail too instead of
    /// waiting forever. Returns `(value, created)`.
    pub fn find_or_create<F>(&self, key: u64, allocate: F) -> LexisResult<(u32, bool)>
    where
        F: FnOnce() -> LexisResult<u32>,
    {
        let key = safe_key(key);
        let (slot, claimed) = self.claim(key)?;
        if !claimed {
            return self.await_value(slot).map(|v| (v, false));
        }
        match allocate() {
            Ok(value) => {
                self.values[slot].store(value, Ordering::Release);
                Ok((value, true))
            }
            Err(e) => {
                self.values[slot].store(OVERFLOW_VALUE, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Insert or overwrite `key`
    pub fn insert(&self, key: u64, value: u32) -> LexisResult<()> {
        let (slot, _) = self.claim(safe_key(key))?;
        self.values[slot].store(value, Ordering::Release);
        Ok(())
    }

    /// Value for `key`, or `NOT_FOUND`
    pub fn lookup(&self, key: u64) -> u32 {
        let key = safe_key(key);
        for slot in self.probe(key) {
            let current = self.keys[slot].load(Ordering::Acquire);
            if current == key {
                return match self.values[slot].load(Ordering::Acquire) {
                    OVERFLOW_VALUE => NOT_FOUND,
                    v => v,
                };
            }
            if current == EMPTY_KEY {
                return NOT_FOUND;
            }
        }
        NOT_FOUND
    }

    /// Replace `key` with a tombstone; returns whether it was present
    pub fn delete(&self, key: u64) -> bool {
        let key = safe_key(key);
        for slot in self.probe(key) {
            let current = self.keys[slot].load(Ordering::Acquire);
            if current == EMPTY_KEY {
                return false;
            }
            if current == key
                && self.keys[slot]
                    .compare_exchange(key, TOMBSTONE_KEY, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.values[slot].store(EMPTY_VALUE, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Treat the value as a counter: first sighting stores 1, later ones add 1.
    ///
    /// Returns the count after this call.
    pub fn insert_or_increment(&self, key: u64) -> LexisResult<u32> {
        let (slot, _) = self.claim(safe_key(key))?;
        let bump = |v: u32| {
            if v == EMPTY_VALUE {
                1
            } else {
                v.saturating_add(1).min(OVERFLOW_VALUE - 1)
            }
        };
        let previous = self.values[slot]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(bump(v)))
            .unwrap_or_else(|v| v);
        Ok(bump(previous))
    }

    /// Make `value` the head stored under `key`, returning the old head.
    ///
    /// The old head is `EMPTY_VALUE` when the key is new. Callers use this
    /// to build singly linked chains: the returned value is the new head's
    /// `next`.
    pub fn push_front(&self, key: u64, value: u32) -> LexisResult<u32> {
        let (slot, _) = self.claim(safe_key(key))?;
        Ok(self.values[slot].swap(value, Ordering::AcqRel))
    }

    /// Every live `(key, value)`, in slot order.
    ///
    /// Not consistent with concurrent inserts.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.keys.iter().zip(self.values.iter()).filter_map(|(k, v)| {
            let key = k.load(Ordering::Acquire);
            if key == EMPTY_KEY || key == TOMBSTONE_KEY {
                None
            } else {
                Some((key, v.load(Ordering::Acquire)))
            }
        })
    }

    /// Live keys
    pub fn len(&self) -> usize {
        self.keys
            .par_iter()
            .filter(|k| {
                let key = k.load(Ordering::Relaxed);
                key != EMPTY_KEY && key != TOMBSTONE_KEY
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Reset every slot, tombstones included
    pub fn clear(&mut self) {
        self.keys
            .par_iter_mut()
            .for_each(|k| *k.get_mut() = EMPTY_KEY);
        self.values
            .par_iter_mut()
            .for_each(|v| *v.get_mut() = EMPTY_VALUE);
    }
}
