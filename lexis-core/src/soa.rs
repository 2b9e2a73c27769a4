//! # Readback Records
//!
//! Pools live as structure-of-arrays in the engine. When the host reads
//! them back, each slot is packed into one of these `#[repr(C)]` rows so
//! the result can be handed around as plain bytes (`bytemuck`).
//!
//! Wide fields come first; every row is a multiple of 8 bytes.

use bytemuck::{Pod, Zeroable};

/// One Word pool slot
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct WordRecord {
    pub name_hash: u64,
    /// Marginal count
    pub count: f64,
    pub class_id: u32,
    pub _pad: u32,
}

/// One Pair pool slot
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PairRecord {
    pub count: f64,
    pub mi: f64,
    pub word_a: u32,
    pub word_b: u32,
    pub flags: u32,
    pub _pad: u32,
}

impl PairRecord {
    /// Counts changed since MI was last computed
    pub const DIRTY: u32 = 1 << 0;

    pub fn is_dirty(&self) -> bool {
        self.flags & Self::DIRTY != 0
    }

    /// Still carries count mass (not eliminated or merged away)
    pub fn is_live(&self) -> bool {
        self.count > 0.0
    }
}

/// Pair slot joined with both endpoint marginals
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PairMiRecord {
    pub count: f64,
    pub mi: f64,
    pub marginal_a: f64,
    pub marginal_b: f64,
    pub word_a: u32,
    pub word_b: u32,
    pub flags: u32,
    pub _pad: u32,
}

/// One Section pool slot
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SectionRecord {
    pub disjunct_hash: u64,
    pub count: f64,
    pub word: u32,
    pub _pad: u32,
}

/// One Candidate pool slot
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CandidateRecord {
    pub dot: f64,
    pub cosine: f64,
    pub word_a: u32,
    pub word_b: u32,
}

/// Pair that passed an MI filter
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MiHit {
    pub mi: f64,
    pub pair: u32,
    pub _pad: u32,
}

/// Candidate that passed a cosine filter
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CandidateHit {
    pub cosine: f64,
    pub word_a: u32,
    pub word_b: u32,
}
