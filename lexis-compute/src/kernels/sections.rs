//! # Section Extraction
//!
//! One work-item per flat token position. The token's connectors come from
//! every parse edge that touches it: the neighbour's word id plus the side
//! the neighbour sits on. The sorted connector set hashes to a disjunct,
//! and `(word, disjunct)` is found or created in the section pool and
//! counted once.

use std::sync::atomic::{AtomicUsize, Ordering};

use lexis_core::batch::ParseBatch;
use lexis_core::error::{LexisError, LexisResult};
use lexis_core::hash::{connector, disjunct_hash, Direction};
use lexis_core::MAX_CONNECTORS;

use crate::kernels::atomspace::find_or_create_section;
use crate::kernels::counting::SentenceLocator;
use crate::kernels::dispatch::{dispatch, DispatchLog};
use crate::pool::SectionPool;

/// Extract and count one section per token with at least one edge.
///
/// Returns `(observed, created)`.
pub fn extract_sections(
    log: &DispatchLog,
    batch: &ParseBatch,
    locator: SentenceLocator,
    sections: &SectionPool,
) -> LexisResult<(usize, usize)> {
    let sentences = batch.sentences();
    let flat = sentences.words();
    let observed = AtomicUsize::new(0);
    let created = AtomicUsize::new(0);

    dispatch(log, flat.len(), |i| {
        let s = locator.locate(sentences, i as u32).ok_or_else(|| {
            LexisError::malformed(format!("position {} belongs to no sentence", i))
        })?;
        let tokens = sentences.sentence(s);
        let pos = i as u32 - sentences.offsets()[s];

        let mut connectors = [0u64; MAX_CONNECTORS];
        let mut n = 0;
        for (p1, p2) in batch.edges(s) {
            let other = if p1 == pos {
                p2
            } else if p2 == pos {
                p1
            } else {
                continue;
            };
            // Degree is bounded when the batch is built
            if n == MAX_CONNECTORS {
                return Err(LexisError::malformed(format!(
                    "position {} has more than {} connectors",
                    i, MAX_CONNECTORS
                )));
            }
            connectors[n] = connector(tokens[other as usize], Direction::between(pos, other));
            n += 1;
        }
        if n == 0 {
            return Ok(());
        }

        let djh = disjunct_hash(&mut connectors[..n]);
        let (slot, fresh) = find_or_create_section(sections, flat[i], djh)?;
        sections.columns().count[slot as usize].fetch_add(1.0);

        observed.fetch_add(1, Ordering::Relaxed);
        if fresh {
            created.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    })?;

    Ok((observed.into_inner(), created.into_inner()))
}
