//! # Compute Backends
//!
//! Implementations of the ComputeBackend trait.

mod cpu;

pub use cpu::CpuBackend;
