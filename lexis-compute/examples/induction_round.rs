//! One round of grammar induction over a toy corpus
//!
//! count → MI → sections → cosine → substitute → MI
use std::collections::HashMap;

use lexis_compute::create_backend;
use lexis_core::hash::word_hash;
use lexis_core::{ClassAssignment, EngineConfig, LexisResult, MiMode, ParseBatch, SentenceBatch};
use tracing::{info, Level};

const CORPUS: &[&str] = &[
    "the cat sat on the mat",
    "the dog sat on the rug",
    "a cat ran to the door",
    "a dog ran to the gate",
    "the cat saw a dog",
    "the dog saw a cat",
];

fn main() -> LexisResult<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    // Optional JSON config path; small pools otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::small(),
    };
    let mut backend = create_backend(&config)?;
    println!("=== Lexis induction round ({}) ===\n", backend.name());

    // Intern words
    let tokens: Vec<Vec<&str>> = CORPUS.iter().map(|s| s.split_whitespace().collect()).collect();
    let flat: Vec<&str> = tokens.iter().flatten().copied().collect();
    let hashes: Vec<u64> = flat.iter().map(|t| word_hash(t)).collect();
    let ids = backend.find_or_create_words(&hashes)?;
    let vocab: HashMap<u32, &str> = ids.iter().copied().zip(flat.iter().copied()).collect();
    let name = |id: u32| vocab.get(&id).copied().unwrap_or("?");

    let mut sentences = Vec::with_capacity(tokens.len());
    let mut rest = ids.as_slice();
    for sentence in &tokens {
        let (head, tail) = rest.split_at(sentence.len());
        sentences.push(head.to_vec());
        rest = tail;
    }

    // Co-occurrence counts and MI
    let batch = SentenceBatch::from_sentences(&sentences)?;
    let counted = backend.count_sentences(&batch, config.compute.window)?;
    info!("{} events over {} pairs", counted.events, counted.pairs);
    backend.compute_mi(MiMode::Dirty)?;

    let strong = backend.mi_filter(1.0, 8);
    println!("Pairs with MI > 1 ({} total):", strong.total_matches);
    let pairs = backend.read_pairs();
    for hit in &strong.hits {
        let p = pairs[hit.pair as usize];
        println!("  {:>6} {:<6} {:.3}", name(p.word_a), name(p.word_b), hit.mi);
    }

    // Sections from a left-to-right chain parse of each sentence
    let edges: Vec<Vec<(u32, u32)>> = sentences
        .iter()
        .map(|s| (1..s.len() as u32).map(|p| (p - 1, p)).collect())
        .collect();
    let parses = ParseBatch::from_parses(&sentences, &edges)?;
    let extracted = backend.extract_sections(&parses)?;
    info!("{} sections ({} new)", extracted.sections, extracted.created);

    let cosines = backend.compute_cosines()?;
    let similar = backend.filter_candidates(0.5, 16);
    println!(
        "\nWord pairs with cosine > 0.5 ({} of {} candidates):",
        similar.total_matches, cosines.candidates
    );
    for hit in &similar.hits {
        println!("  {:>6} ~ {:<6} {:.3}", name(hit.word_a), name(hit.word_b), hit.cosine);
    }

    // Fold the most similar pair into one class
    if let Some(best) = similar
        .hits
        .iter()
        .max_by(|a, b| a.cosine.total_cmp(&b.cosine))
    {
        let assignment = ClassAssignment::from_pairs(&[(best.word_b, best.word_a)])?;
        backend.assign_classes(&assignment)?;
        let report = backend.substitute()?;
        let n = backend.rebuild_marginals()?;
        let recomputed = backend.compute_mi(MiMode::Dirty)?;
        println!(
            "\nMerged {} into {}: {} pairs changed, {} merged, {} sections changed",
            name(best.word_b),
            name(best.word_a),
            report.pairs_changed,
            report.merged,
            report.sections_changed
        );
        println!("N = {}, MI recomputed for {} pairs", n, recomputed);
    }

    let stats = backend.stats();
    println!(
        "\n{} dispatches, {} work-items, {}us total",
        stats.dispatches, stats.work_items, stats.total_time_us
    );
    Ok(())
}
