//! # Lexis Core
//!
//! Core types and traits for Lexis, a concurrent record store for
//! corpus-derived lexical statistics.
//!
//! This crate provides the fundamental building blocks:
//! - **Hashing**: content keys for words, pairs, sections and candidates
//! - **Batches**: validated sentence and parse inputs
//! - **Records**: `#[repr(C)]` readback rows for every pool
//! - **ComputeBackend**: the stage entry points a backend must provide
//!
//! ## Sentinels
//!
//! Hash indices store `(u64 key, u32 value)` slots. The all-ones key marks
//! an empty slot and the all-ones value means "not found". Keys computed
//! from content that collide with a sentinel are remapped to `0`.

pub mod batch;
pub mod config;
pub mod error;
pub mod hash;
pub mod soa;
pub mod traits;

// Re-export main types at crate root
pub use batch::{ClassAssignment, ParseBatch, SentenceBatch};
pub use config::EngineConfig;
pub use error::{LexisError, LexisResult};
pub use hash::Direction;
pub use soa::{CandidateHit, CandidateRecord, MiHit, PairMiRecord, PairRecord, SectionRecord, WordRecord};
pub use traits::*;

/// Key of an empty hash slot
pub const EMPTY_KEY: u64 = u64::MAX;

/// Key left behind by a delete; probes continue past it
pub const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Value of an unpublished slot, and the "not found" lookup result
pub const EMPTY_VALUE: u32 = u32::MAX;

/// Alias used by lookups
pub const NOT_FOUND: u32 = EMPTY_VALUE;

/// Published in place of a pool index when the allocating caller overflowed
pub const OVERFLOW_VALUE: u32 = u32::MAX - 1;

/// Class id of a word that has not been assigned to a class
pub const NO_CLASS: u32 = u32::MAX;

/// Largest number of connectors a single token may carry
pub const MAX_CONNECTORS: usize = 64;

/// Largest pool capacity that keeps every index clear of the value sentinels
pub const MAX_POOL_CAPACITY: usize = (u32::MAX - 2) as usize;
