//! # Lexis Compute
//!
//! Concurrent engine for Lexis' lexical record store.
//!
//! All pools live in fixed arenas of atomics. Kernels are written as one
//! closure per work-item and run through a parallel dispatch, so the same
//! code paths hold under any number of concurrent callers.
//!
//! - **hashtable**: lock-free open-addressing index
//! - **pool**: record arenas with find-or-create
//! - **kernels**: counting, MI, sections, cosine, substitution
//! - **store**: the pools and counters one engine owns
//! - **backend**: the Rayon-backed `ComputeBackend`

pub mod atomic;
pub mod backend;
pub mod hashtable;
pub mod kernels;
pub mod pool;
pub mod store;

pub use atomic::AtomicF64;
pub use backend::CpuBackend;
pub use hashtable::ConcurrentHashIndex;
pub use pool::{CandidatePool, PairPool, RecordPool, SectionPool, WordPool};
pub use store::LexiconStore;

use lexis_core::config::EngineConfig;
use lexis_core::error::LexisResult;
use lexis_core::traits::ComputeBackend;

/// Create the compute backend described by the configuration
pub fn create_backend(config: &EngineConfig) -> LexisResult<Box<dyn ComputeBackend>> {
    tracing::info!("Using CPU backend (Rayon)");
    Ok(Box::new(CpuBackend::new(config)?))
}
