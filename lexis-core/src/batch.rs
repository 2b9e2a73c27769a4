//! # Batch Inputs
//!
//! Host-side descriptions of the work handed to the kernels. Every
//! constructor validates its arrays so that a kernel never has to guess
//! where a sentence or an edge list ends.

use std::collections::HashSet;

use crate::error::{LexisError, LexisResult};
use crate::MAX_CONNECTORS;

/// A batch of tokenized sentences, flattened.
///
/// Sentence `s` covers `words[offsets[s] .. offsets[s] + lengths[s]]`.
/// Sentences tile `words` in order with no gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SentenceBatch {
    words: Vec<u32>,
    offsets: Vec<u32>,
    lengths: Vec<u32>,
}

impl SentenceBatch {
    /// Build a batch from flat arrays, rejecting anything that does not tile
    pub fn new(words: Vec<u32>, offsets: Vec<u32>, lengths: Vec<u32>) -> LexisResult<Self> {
        if offsets.len() != lengths.len() {
            return Err(LexisError::malformed(format!(
                "{} sentence offsets but {} lengths",
                offsets.len(),
                lengths.len()
            )));
        }
        if words.len() > u32::MAX as usize {
            return Err(LexisError::malformed("batch exceeds u32 positions"));
        }

        let mut cursor: u64 = 0;
        for (s, (&off, &len)) in offsets.iter().zip(lengths.iter()).enumerate() {
            if off as u64 != cursor {
                return Err(LexisError::malformed(format!(
                    "sentence {} starts at {} but previous sentence ends at {}",
                    s, off, cursor
                )));
            }
            cursor += len as u64;
        }
        if cursor != words.len() as u64 {
            return Err(LexisError::malformed(format!(
                "sentences cover {} words but batch has {}",
                cursor,
                words.len()
            )));
        }

        Ok(Self {
            words,
            offsets,
            lengths,
        })
    }

    /// Build a batch from one slice per sentence
    pub fn from_sentences<S: AsRef<[u32]>>(sentences: &[S]) -> LexisResult<Self> {
        let mut words = Vec::new();
        let mut offsets = Vec::with_capacity(sentences.len());
        let mut lengths = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            let sentence = sentence.as_ref();
            offsets.push(words.len() as u32);
            lengths.push(sentence.len() as u32);
            words.extend_from_slice(sentence);
        }
        Self::new(words, offsets, lengths)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn num_sentences(&self) -> usize {
        self.offsets.len()
    }

    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    /// Words of sentence `s`
    pub fn sentence(&self, s: usize) -> &[u32] {
        let start = self.offsets[s] as usize;
        &self.words[start..start + self.lengths[s] as usize]
    }

    /// Largest word index referenced, if any
    pub fn max_word(&self) -> Option<u32> {
        self.words.iter().copied().max()
    }
}

/// Sentences plus one dependency (MST) edge list per sentence.
///
/// Edge positions are relative to the start of their sentence.
/// Sentence `s` owns edges `edge_offsets[s] .. edge_offsets[s] + edge_counts[s]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseBatch {
    sentences: SentenceBatch,
    edge_p1: Vec<u32>,
    edge_p2: Vec<u32>,
    edge_offsets: Vec<u32>,
    edge_counts: Vec<u32>,
}

impl ParseBatch {
    pub fn new(
        sentences: SentenceBatch,
        edge_p1: Vec<u32>,
        edge_p2: Vec<u32>,
        edge_offsets: Vec<u32>,
        edge_counts: Vec<u32>,
    ) -> LexisResult<Self> {
        if edge_p1.len() != edge_p2.len() {
            return Err(LexisError::malformed(format!(
                "{} edge starts but {} edge ends",
                edge_p1.len(),
                edge_p2.len()
            )));
        }
        let ns = sentences.num_sentences();
        if edge_offsets.len() != ns || edge_counts.len() != ns {
            return Err(LexisError::malformed(format!(
                "edge ranges given for {}/{} sentences, batch has {}",
                edge_offsets.len(),
                edge_counts.len(),
                ns
            )));
        }

        for s in 0..ns {
            let start = edge_offsets[s] as usize;
            let end = start + edge_counts[s] as usize;
            if end > edge_p1.len() {
                return Err(LexisError::malformed(format!(
                    "sentence {} edges {}..{} exceed {} edges",
                    s,
                    start,
                    end,
                    edge_p1.len()
                )));
            }
            let len = sentences.lengths()[s];
            let mut degree = vec![0usize; len as usize];
            for e in start..end {
                let (p1, p2) = (edge_p1[e], edge_p2[e]);
                if p1 >= len || p2 >= len {
                    return Err(LexisError::malformed(format!(
                        "edge ({}, {}) outside sentence {} of length {}",
                        p1, p2, s, len
                    )));
                }
                if p1 == p2 {
                    return Err(LexisError::malformed(format!(
                        "self-edge at position {} in sentence {}",
                        p1, s
                    )));
                }
                degree[p1 as usize] += 1;
                degree[p2 as usize] += 1;
            }
            if let Some(pos) = degree.iter().position(|&d| d > MAX_CONNECTORS) {
                return Err(LexisError::malformed(format!(
                    "position {} in sentence {} has more than {} connectors",
                    pos, s, MAX_CONNECTORS
                )));
            }
        }

        Ok(Self {
            sentences,
            edge_p1,
            edge_p2,
            edge_offsets,
            edge_counts,
        })
    }

    /// Build from per-sentence word lists and per-sentence edge lists
    pub fn from_parses<S: AsRef<[u32]>, E: AsRef<[(u32, u32)]>>(
        sentences: &[S],
        edges: &[E],
    ) -> LexisResult<Self> {
        if sentences.len() != edges.len() {
            return Err(LexisError::malformed(format!(
                "{} sentences but {} edge lists",
                sentences.len(),
                edges.len()
            )));
        }
        let batch = SentenceBatch::from_sentences(sentences)?;
        let mut p1 = Vec::new();
        let mut p2 = Vec::new();
        let mut offsets = Vec::with_capacity(edges.len());
        let mut counts = Vec::with_capacity(edges.len());
        for list in edges {
            let list = list.as_ref();
            offsets.push(p1.len() as u32);
            counts.push(list.len() as u32);
            for &(a, b) in list {
                p1.push(a);
                p2.push(b);
            }
        }
        Self::new(batch, p1, p2, offsets, counts)
    }

    pub fn sentences(&self) -> &SentenceBatch {
        &self.sentences
    }

    pub fn edge_p1(&self) -> &[u32] {
        &self.edge_p1
    }

    pub fn edge_p2(&self) -> &[u32] {
        &self.edge_p2
    }

    pub fn edge_offsets(&self) -> &[u32] {
        &self.edge_offsets
    }

    pub fn edge_counts(&self) -> &[u32] {
        &self.edge_counts
    }

    /// Edges of sentence `s` as `(p1, p2)` iterator
    pub fn edges(&self, s: usize) -> impl Iterator<Item = (u32, u32)> + '_ {
        let start = self.edge_offsets[s] as usize;
        let end = start + self.edge_counts[s] as usize;
        self.edge_p1[start..end]
            .iter()
            .copied()
            .zip(self.edge_p2[start..end].iter().copied())
    }
}

/// Bulk word → class mapping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassAssignment {
    words: Vec<u32>,
    classes: Vec<u32>,
}

impl ClassAssignment {
    /// Each word index may appear at most once
    pub fn new(words: Vec<u32>, classes: Vec<u32>) -> LexisResult<Self> {
        if words.len() != classes.len() {
            return Err(LexisError::malformed(format!(
                "{} words but {} class ids",
                words.len(),
                classes.len()
            )));
        }
        let mut seen = HashSet::with_capacity(words.len());
        for &w in &words {
            if !seen.insert(w) {
                return Err(LexisError::malformed(format!(
                    "word {} assigned more than once",
                    w
                )));
            }
        }
        Ok(Self { words, classes })
    }

    pub fn from_pairs(pairs: &[(u32, u32)]) -> LexisResult<Self> {
        let (words, classes) = pairs.iter().copied().unzip();
        Self::new(words, classes)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn classes(&self) -> &[u32] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
