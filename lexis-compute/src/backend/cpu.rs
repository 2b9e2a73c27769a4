//! # CPU Backend
//!
//! Runs every kernel on a dedicated Rayon thread pool.
//!
//! A dispatch is a parallel iteration over work-item indices; all shared
//! state lives in atomics, so kernels written for thousands of GPU
//! work-items run unchanged on a handful of cores.

use std::time::Instant;

use lexis_core::batch::{ClassAssignment, ParseBatch, SentenceBatch};
use lexis_core::config::EngineConfig;
use lexis_core::error::{LexisError, LexisResult};
use lexis_core::soa::{
    CandidateHit, CandidateRecord, MiHit, PairMiRecord, PairRecord, SectionRecord, WordRecord,
};
use lexis_core::traits::{
    BackendStats, ComputeBackend, CosineReport, CountingReport, FilterOutput, MiMode, MiStats,
    PoolStats, SectionReport, SubstitutionReport,
};

use crate::store::LexiconStore;

/// CPU compute backend using Rayon
pub struct CpuBackend {
    /// Pools and counters
    store: LexiconStore,

    /// Workers that run every dispatch
    pool: rayon::ThreadPool,

    /// Timing statistics
    stats: BackendStats,
}

impl CpuBackend {
    /// Create a new CPU backend
    pub fn new(config: &EngineConfig) -> LexisResult<Self> {
        let store = LexiconStore::new(config)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.compute.threads)
            .thread_name(|i| format!("lexis-worker-{}", i))
            .build()
            .map_err(|e| LexisError::compute(format!("failed to start worker pool: {}", e)))?;

        tracing::info!("CPU backend ready with {} workers", pool.current_num_threads());

        Ok(Self {
            store,
            pool,
            stats: BackendStats::default(),
        })
    }

    pub fn store(&self) -> &LexiconStore {
        &self.store
    }

    /// Run one stage on the worker pool and record its time
    fn run<T, F>(&mut self, stage: &'static str, f: F) -> T
    where
        T: Send,
        F: FnOnce(&mut LexiconStore) -> T + Send,
    {
        let start = Instant::now();
        let store = &mut self.store;
        let out = self.pool.install(|| f(store));

        let elapsed = start.elapsed().as_micros() as u64;
        self.stats.compute_time_us = elapsed;
        self.stats.total_time_us += elapsed;
        tracing::debug!("{} took {}us", stage, elapsed);
        out
    }
}

impl ComputeBackend for CpuBackend {
    fn find_or_create_words(&mut self, hashes: &[u64]) -> LexisResult<Vec<u32>> {
        self.run("find_or_create_words", |s| s.find_or_create_words(hashes))
    }

    fn find_or_create_pairs(&mut self, word_a: &[u32], word_b: &[u32]) -> LexisResult<Vec<u32>> {
        self.run("find_or_create_pairs", |s| s.find_or_create_pairs(word_a, word_b))
    }

    fn find_or_create_sections(
        &mut self,
        words: &[u32],
        disjuncts: &[u64],
    ) -> LexisResult<Vec<u32>> {
        self.run("find_or_create_sections", |s| {
            s.find_or_create_sections(words, disjuncts)
        })
    }

    fn count_pairs(&mut self, pairs: &[u32]) -> LexisResult<()> {
        self.run("count_pairs", |s| s.count_pairs(pairs))
    }

    fn count_sections(&mut self, sections: &[u32]) -> LexisResult<()> {
        self.run("count_sections", |s| s.count_sections(sections))
    }

    fn count_sentences(
        &mut self,
        batch: &SentenceBatch,
        window: u32,
    ) -> LexisResult<CountingReport> {
        self.run("count_sentences", |s| s.count_sentences(batch, window))
    }

    fn compute_mi(&mut self, mode: MiMode) -> LexisResult<usize> {
        Ok(self.run("compute_mi", |s| s.compute_mi(mode)))
    }

    fn mi_stats(&mut self, threshold: f64) -> MiStats {
        self.run("mi_stats", |s| s.mi_stats(threshold))
    }

    fn mi_filter(&mut self, threshold: f64, max_out: usize) -> FilterOutput<MiHit> {
        self.run("mi_filter", |s| s.mi_filter(threshold, max_out))
    }

    fn extract_sections(&mut self, batch: &ParseBatch) -> LexisResult<SectionReport> {
        self.run("extract_sections", |s| s.extract_sections(batch))
    }

    fn compute_cosines(&mut self) -> LexisResult<CosineReport> {
        self.run("compute_cosines", |s| s.compute_cosines())
    }

    fn filter_candidates(&mut self, threshold: f64, max_out: usize) -> FilterOutput<CandidateHit> {
        self.run("filter_candidates", |s| s.filter_candidates(threshold, max_out))
    }

    fn assign_classes(&mut self, assignment: &ClassAssignment) -> LexisResult<()> {
        self.run("assign_classes", |s| s.assign_classes(assignment))
    }

    fn substitute_pairs(&mut self) -> LexisResult<SubstitutionReport> {
        Ok(self.run("substitute_pairs", |s| s.substitute_pairs()))
    }

    fn rebuild_pair_index(&mut self) -> LexisResult<usize> {
        self.run("rebuild_pair_index", |s| s.rebuild_pair_index())
    }

    fn substitute_section_words(&mut self) -> LexisResult<usize> {
        Ok(self.run("substitute_section_words", |s| s.substitute_section_words()))
    }

    fn rebuild_marginals(&mut self) -> LexisResult<u64> {
        self.run("rebuild_marginals", |s| s.rebuild_marginals())
    }

    fn load_pair_counts(&mut self, pairs: &[u32], counts: &[f64]) -> LexisResult<()> {
        self.store.load_pair_counts(pairs, counts)
    }

    fn load_section_counts(&mut self, sections: &[u32], counts: &[f64]) -> LexisResult<()> {
        self.store.load_section_counts(sections, counts)
    }

    fn load_word_counts(&mut self, words: &[u32], counts: &[f64]) -> LexisResult<()> {
        self.store.load_word_counts(words, counts)
    }

    fn set_total_events(&mut self, total: u64) {
        self.store.set_total_events(total);
    }

    fn total_events(&self) -> u64 {
        self.store.total_events()
    }

    fn read_words(&self) -> Vec<WordRecord> {
        self.pool.install(|| self.store.read_words())
    }

    fn read_pairs(&self) -> Vec<PairRecord> {
        self.pool.install(|| self.store.read_pairs())
    }

    fn read_pairs_with_mi(&self) -> Vec<PairMiRecord> {
        self.pool.install(|| self.store.read_pairs_with_mi())
    }

    fn read_sections(&self) -> Vec<SectionRecord> {
        self.pool.install(|| self.store.read_sections())
    }

    fn read_candidates(&self) -> Vec<CandidateRecord> {
        self.pool.install(|| self.store.read_candidates())
    }

    fn pool_stats(&self) -> PoolStats {
        self.store.pool_stats()
    }

    fn reset(&mut self) {
        self.run("reset", |s| s.reset());
    }

    fn stats(&self) -> BackendStats {
        let log = self.store.log();
        BackendStats {
            dispatches: log.dispatches(),
            work_items: log.work_items(),
            overflows: log.overflows(),
            ..self.stats.clone()
        }
    }

    fn sync(&mut self) -> LexisResult<()> {
        // Every stage returns after its last dispatch
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CPU (Rayon)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_backend;
    use lexis_core::config::CapacityConfig;
    use lexis_core::hash::word_hash;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    const CORPUS: [&str; 4] = ["the cat sat", "the dog sat", "a cat ran", "a dog ran"];

    /// Interns every token and returns (name → id, sentences as ids)
    fn intern(backend: &mut dyn ComputeBackend) -> (HashMap<String, u32>, Vec<Vec<u32>>) {
        let tokens: Vec<&str> = CORPUS.iter().flat_map(|s| s.split_whitespace()).collect();
        let hashes: Vec<u64> = tokens.iter().map(|t| word_hash(t)).collect();
        let ids = backend.find_or_create_words(&hashes).unwrap();

        let vocab: HashMap<String, u32> = tokens
            .iter()
            .zip(&ids)
            .map(|(t, &id)| (t.to_string(), id))
            .collect();
        let sentences = ids.chunks(3).map(|c| c.to_vec()).collect();
        (vocab, sentences)
    }

    fn chain_parses(sentences: &[Vec<u32>]) -> ParseBatch {
        let edges: Vec<Vec<(u32, u32)>> = sentences.iter().map(|_| vec![(0, 1), (1, 2)]).collect();
        ParseBatch::from_parses(sentences, &edges).unwrap()
    }

    #[test]
    fn test_cpu_backend_creation() {
        let backend = CpuBackend::new(&EngineConfig::small());
        assert!(backend.is_ok());

        let backend = create_backend(&EngineConfig::small()).unwrap();
        assert_eq!(backend.name(), "CPU (Rayon)");
        assert_eq!(backend.pool_stats(), PoolStats::default());
    }

    #[test]
    fn test_thread_count_from_config() {
        let mut config = EngineConfig::small();
        config.compute.threads = 2;
        let backend = CpuBackend::new(&config).unwrap();
        assert_eq!(backend.pool.current_num_threads(), 2);
    }

    #[test]
    fn test_full_induction_round() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let (vocab, sentences) = intern(backend.as_mut());
        assert_eq!(vocab.len(), 6);
        let id = |w: &str| vocab[w];

        // Counting
        let batch = SentenceBatch::from_sentences(&sentences).unwrap();
        let report = backend.count_sentences(&batch, 2).unwrap();
        assert_eq!(report.events, 12);
        assert_eq!(report.total_events, 12);
        assert_eq!(report.pairs, 10);

        // MI
        assert_eq!(backend.compute_mi(MiMode::Dirty).unwrap(), 10);
        assert_eq!(backend.compute_mi(MiMode::Dirty).unwrap(), 0);
        let stats = backend.mi_stats(0.0);
        assert_eq!(stats.nonzero, 10);
        let hits = backend.mi_filter(f64::MIN, 100);
        assert_eq!(hits.total_matches, 10);
        assert!(!hits.truncated());

        // Sections and cosines
        let sections = backend.extract_sections(&chain_parses(&sentences)).unwrap();
        assert_eq!(sections.observed, 12);
        assert_eq!(sections.created, 12);

        let cosines = backend.compute_cosines().unwrap();
        assert_eq!(cosines.chained, 12);
        assert_eq!(cosines.candidates, 3);

        let similar = backend.filter_candidates(0.99, 10);
        assert_eq!(similar.total_matches, 3);
        let mut found: Vec<(u32, u32)> = similar.hits.iter().map(|h| (h.word_a, h.word_b)).collect();
        found.sort_unstable();
        let mut expected: Vec<(u32, u32)> = [("cat", "dog"), ("the", "a"), ("sat", "ran")]
            .iter()
            .map(|(a, b)| {
                let (a, b) = (id(a), id(b));
                (a.min(b), a.max(b))
            })
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);

        // Fold dog into cat
        let assignment = ClassAssignment::from_pairs(&[(id("dog"), id("cat"))]).unwrap();
        backend.assign_classes(&assignment).unwrap();
        let sub = backend.substitute().unwrap();
        assert_eq!(sub.pairs_changed, 4);
        assert_eq!(sub.eliminated, 0);
        assert_eq!(sub.merged, 4);
        assert_eq!(sub.sections_changed, 2);

        let live: Vec<PairRecord> = backend.read_pairs().into_iter().filter(|p| p.is_live()).collect();
        assert_eq!(live.len(), 6);
        assert!(live.iter().all(|p| p.count == 2.0));
        assert!(live.iter().all(|p| p.word_a != id("dog") && p.word_b != id("dog")));

        // Marginals and N follow the merged pairs
        assert_eq!(backend.rebuild_marginals().unwrap(), 12);
        assert_eq!(backend.total_events(), 12);
        let words: HashMap<u64, f64> = backend
            .read_words()
            .into_iter()
            .map(|w| (w.name_hash, w.count))
            .collect();
        assert_eq!(words[&word_hash("cat")], 8.0);
        assert_eq!(words[&word_hash("dog")], 0.0);
        assert_eq!(words[&word_hash("the")], 4.0);

        // Only the merge owners are dirty
        assert_eq!(backend.compute_mi(MiMode::Dirty).unwrap(), 4);
        let (a, b) = (id("the"), id("cat"));
        let key = (a.min(b), a.max(b));
        let the_cat = backend
            .read_pairs_with_mi()
            .into_iter()
            .find(|p| (p.word_a, p.word_b) == key && p.count > 0.0)
            .unwrap();
        assert_eq!(the_cat.marginal_a * the_cat.marginal_b, 32.0);
        assert!((the_cat.mi - 0.75f64.log2()).abs() < 1e-12);

        let stats = backend.stats();
        assert!(stats.dispatches > 0);
        assert!(stats.work_items > 0);
        assert_eq!(stats.overflows, 0);
    }

    #[test]
    fn test_random_corpus_conserves_mass() {
        let mut backend = CpuBackend::new(&EngineConfig::small()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let sentences: Vec<Vec<u32>> = (0..500)
            .map(|_| {
                let len = rng.gen_range(1..12);
                (0..len).map(|_| rng.gen_range(0..300)).collect()
            })
            .collect();
        let batch = SentenceBatch::from_sentences(&sentences).unwrap();
        let report = backend.count_sentences(&batch, 3).unwrap();

        let mass: f64 = backend.read_pairs().iter().map(|p| p.count).sum();
        assert_eq!(mass, report.events as f64);

        let marginals = |b: &CpuBackend| -> Vec<f64> {
            (0..300)
                .map(|w| b.store().words().columns().count[w].load())
                .collect()
        };
        let counted = marginals(&backend);
        assert_eq!(counted.iter().sum::<f64>(), 2.0 * mass);

        // Rebuilding from the pairs reproduces what counting accumulated
        assert_eq!(backend.rebuild_marginals().unwrap(), report.events);
        assert_eq!(marginals(&backend), counted);
    }

    #[test]
    fn test_dirty_mi_after_second_batch() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let first = SentenceBatch::from_sentences(&[vec![0, 1, 2, 3], vec![4, 5]]).unwrap();
        backend.count_sentences(&first, 2).unwrap();
        backend.compute_mi(MiMode::Dirty).unwrap();
        let before = backend.read_pairs();

        let second = SentenceBatch::from_sentences(&[vec![0, 1]]).unwrap();
        backend.count_sentences(&second, 2).unwrap();
        assert_eq!(backend.compute_mi(MiMode::Dirty).unwrap(), 1);

        let after = backend.read_pairs();
        assert!(after.iter().all(|p| !p.is_dirty()));
        for (old, new) in before.iter().zip(&after) {
            if (new.word_a, new.word_b) == (0, 1) {
                assert_eq!(new.count, 2.0);
                assert_ne!(new.mi, old.mi);
            } else {
                assert_eq!(new.mi, old.mi);
            }
        }
    }

    #[test]
    fn test_count_pairs_feeds_total_events() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let slots = backend.find_or_create_pairs(&[3, 4], &[4, 5]).unwrap();
        backend.count_pairs(&[slots[0], slots[0], slots[1]]).unwrap();
        assert_eq!(backend.total_events(), 3);

        let pairs = backend.read_pairs();
        assert_eq!(pairs[slots[0] as usize].count, 2.0);
        assert_eq!(pairs[slots[1] as usize].count, 1.0);
    }

    #[test]
    fn test_section_upload_and_count() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let slots = backend
            .find_or_create_sections(&[1, 2], &[0xAB, 0xAB])
            .unwrap();
        backend.load_section_counts(&slots, &[2.0, 3.0]).unwrap();
        backend.count_sections(&[slots[0]]).unwrap();

        let cosines = backend.compute_cosines().unwrap();
        assert_eq!((cosines.chained, cosines.disjuncts, cosines.candidates), (2, 1, 1));
        let candidate = backend.read_candidates()[0];
        assert_eq!((candidate.word_a, candidate.word_b), (1, 2));
        assert_eq!(candidate.dot, 9.0);
        assert_eq!(candidate.cosine, 1.0);
    }

    #[test]
    fn test_overflow_is_reported() {
        let config = EngineConfig {
            capacity: CapacityConfig::for_pools(64, 4, 16, 16),
            ..EngineConfig::small()
        };
        let mut backend = create_backend(&config).unwrap();
        let batch = SentenceBatch::from_sentences(&[vec![0, 1, 2, 3, 4, 5]]).unwrap();
        let err = backend.count_sentences(&batch, 5).unwrap_err();
        assert!(err.is_overflow());
        assert!(backend.stats().overflows >= 1);
        assert_eq!(backend.pool_stats().pairs, 4);
    }

    #[test]
    fn test_pair_lookup_survives_substitution() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let batch = SentenceBatch::from_sentences(&[vec![1, 2, 3]]).unwrap();
        backend.count_sentences(&batch, 2).unwrap();
        backend
            .assign_classes(&ClassAssignment::from_pairs(&[(2, 9)]).unwrap())
            .unwrap();
        backend.substitute().unwrap();

        // The rebuilt index resolves the new key to the surviving slot
        let slot = backend.find_or_create_pairs(&[9], &[1]).unwrap()[0];
        let pair = backend.read_pairs()[slot as usize];
        assert_eq!((pair.word_a, pair.word_b, pair.count), (1, 9, 1.0));
        assert_eq!(backend.pool_stats().pairs, 3);
    }

    #[test]
    fn test_reset() {
        let mut backend = create_backend(&EngineConfig::small()).unwrap();
        let (_, sentences) = intern(backend.as_mut());
        let batch = SentenceBatch::from_sentences(&sentences).unwrap();
        backend.count_sentences(&batch, 2).unwrap();
        backend.extract_sections(&chain_parses(&sentences)).unwrap();
        backend.compute_cosines().unwrap();

        backend.reset();
        assert_eq!(backend.pool_stats(), PoolStats::default());
        assert_eq!(backend.total_events(), 0);
        assert!(backend.read_candidates().is_empty());
        assert!(backend.sync().is_ok());
    }
}
