//! Kernels for the lexical store
//!
//! Each kernel is a function over work-item indices, run by `dispatch`:
//! - `atomspace`: find-or-create for words, pairs and sections; counting by index
//! - `counting`: sentence-window pair counting
//! - `mi`: pointwise mutual information, stats and filter
//! - `sections`: parse-edge section extraction
//! - `cosine`: disjunct-vector cosine similarity between words
//! - `substitute`: word-to-class folding and pair merging
//! - `dispatch`: the dispatch helpers and bounded output compaction

pub mod atomspace;
pub mod cosine;
pub mod counting;
pub mod dispatch;
pub mod mi;
pub mod sections;
pub mod substitute;

pub use cosine::CosineWorkspace;
pub use counting::SentenceLocator;
pub use dispatch::{Compactor, DispatchLog};
