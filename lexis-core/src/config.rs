//! # Configuration
//!
//! Every pool and index is sized once, when the engine is created. There
//! is no resizing afterwards, so these numbers decide how large a corpus
//! one engine instance can absorb.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LexisError, LexisResult};
use crate::MAX_POOL_CAPACITY;

/// Master configuration for a Lexis engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pool and index sizes
    pub capacity: CapacityConfig,

    /// Compute settings
    pub compute: ComputeConfig,
}

/// Fixed capacities of every pool and hash index
///
/// Index capacities must be powers of two and should be at least twice
/// the pool they index, keeping the load factor at or below 50%.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Word pool slots
    pub word_pool: usize,

    /// Word name-hash index slots
    pub word_index: usize,

    /// Pair pool slots
    pub pair_pool: usize,

    /// Pair key index slots
    pub pair_index: usize,

    /// Section pool slots
    pub section_pool: usize,

    /// Section key index slots
    pub section_index: usize,

    /// Disjunct → chain head index slots (cosine stage)
    pub disjunct_index: usize,

    /// Candidate pool slots (cosine stage)
    pub candidate_pool: usize,

    /// Candidate key index slots
    pub candidate_index: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            word_pool: 128 * 1024,
            word_index: 256 * 1024,
            pair_pool: 4 * 1024 * 1024,
            pair_index: 8 * 1024 * 1024,
            section_pool: 1024 * 1024,
            section_index: 2 * 1024 * 1024,
            disjunct_index: 2 * 1024 * 1024,
            candidate_pool: 512 * 1024,
            candidate_index: 1024 * 1024,
        }
    }
}

impl CapacityConfig {
    /// Size every index at the next power of two at least twice its pool
    pub fn for_pools(words: usize, pairs: usize, sections: usize, candidates: usize) -> Self {
        Self {
            word_pool: words,
            word_index: index_for(words),
            pair_pool: pairs,
            pair_index: index_for(pairs),
            section_pool: sections,
            section_index: index_for(sections),
            disjunct_index: index_for(sections),
            candidate_pool: candidates,
            candidate_index: index_for(candidates),
        }
    }

    /// Approximate resident size in bytes
    pub fn memory_bytes(&self) -> usize {
        // key u64 + value u32 per index slot
        let index = |n: usize| n * 12;
        self.word_pool * (8 + 8 + 4 + 8)
            + index(self.word_index)
            + self.pair_pool * (4 + 4 + 8 + 8 + 4)
            + index(self.pair_index)
            + self.section_pool * (4 + 8 + 8 + 4)
            + index(self.section_index)
            + index(self.disjunct_index)
            + self.candidate_pool * (4 + 4 + 8 + 8)
            + index(self.candidate_index)
    }

    fn validate(&self) -> LexisResult<()> {
        let pools = [
            ("word", self.word_pool, self.word_index),
            ("pair", self.pair_pool, self.pair_index),
            ("section", self.section_pool, self.section_index),
            ("disjunct", self.section_pool, self.disjunct_index),
            ("candidate", self.candidate_pool, self.candidate_index),
        ];
        for (name, pool, index) in pools {
            if pool == 0 {
                return Err(LexisError::config(format!("{} pool capacity is zero", name)));
            }
            if pool > MAX_POOL_CAPACITY {
                return Err(LexisError::config(format!(
                    "{} pool capacity {} exceeds {}",
                    name, pool, MAX_POOL_CAPACITY
                )));
            }
            if !index.is_power_of_two() {
                return Err(LexisError::config(format!(
                    "{} index capacity {} is not a power of two",
                    name, index
                )));
            }
            if index < pool {
                return Err(LexisError::config(format!(
                    "{} index capacity {} is smaller than its pool ({})",
                    name, index, pool
                )));
            }
        }
        Ok(())
    }
}

fn index_for(pool: usize) -> usize {
    pool.saturating_mul(2).max(1).next_power_of_two()
}

/// How counting work-items find the sentence that owns their position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountingStrategy {
    /// Scan sentence boundaries front to back
    Linear,
    /// Binary search over sentence offsets
    BinarySearch,
    /// Binary search once a batch is larger than `binary_search_threshold`
    Auto,
}

/// Compute configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads (0 = one per core)
    pub threads: usize,

    /// Sentence lookup used by the counting stage
    pub counting_strategy: CountingStrategy,

    /// Sentence count above which `Auto` switches to binary search
    pub binary_search_threshold: usize,

    /// Default co-occurrence window
    pub window: u32,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            counting_strategy: CountingStrategy::Auto,
            binary_search_threshold: 64,
            window: 6,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> LexisResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> LexisResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that the configuration describes a usable engine
    pub fn validate(&self) -> LexisResult<()> {
        self.capacity.validate()?;
        if self.compute.window == 0 {
            return Err(LexisError::config("window must be at least 1"));
        }
        Ok(())
    }

    /// Small pools for tests and local development
    pub fn small() -> Self {
        Self {
            capacity: CapacityConfig::for_pools(1024, 16 * 1024, 4 * 1024, 4 * 1024),
            compute: ComputeConfig::default(),
        }
    }

    /// Create config from environment variables
    ///
    /// Reads:
    /// - LEXIS_WORD_CAPACITY, LEXIS_PAIR_CAPACITY, LEXIS_SECTION_CAPACITY,
    ///   LEXIS_CANDIDATE_CAPACITY: pool sizes (indices follow at 2x)
    /// - LEXIS_THREADS: worker threads (default: one per core)
    /// - LEXIS_WINDOW: co-occurrence window (default: 6)
    /// - LEXIS_COUNTING: "linear", "binary" or "auto"
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let pool = |name: &str, default: usize| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let defaults = CapacityConfig::default();
        config.capacity = CapacityConfig::for_pools(
            pool("LEXIS_WORD_CAPACITY", defaults.word_pool),
            pool("LEXIS_PAIR_CAPACITY", defaults.pair_pool),
            pool("LEXIS_SECTION_CAPACITY", defaults.section_pool),
            pool("LEXIS_CANDIDATE_CAPACITY", defaults.candidate_pool),
        );

        if let Ok(val) = std::env::var("LEXIS_THREADS") {
            if let Ok(v) = val.parse() {
                config.compute.threads = v;
            }
        }
        if let Ok(val) = std::env::var("LEXIS_WINDOW") {
            if let Ok(v) = val.parse() {
                config.compute.window = v;
            }
        }
        if let Ok(val) = std::env::var("LEXIS_COUNTING") {
            match val.to_lowercase().as_str() {
                "linear" => config.compute.counting_strategy = CountingStrategy::Linear,
                "binary" => config.compute.counting_strategy = CountingStrategy::BinarySearch,
                "auto" => config.compute.counting_strategy = CountingStrategy::Auto,
                _ => {}
            }
        }

        config
    }
}
