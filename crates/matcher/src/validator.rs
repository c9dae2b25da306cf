use std::sync::Arc;

use index::BlockSource;
use tokens::{frames, FrameError, TokenBag};
use tracing::{debug, warn};

use crate::lookup::ForwardLookup;
use crate::query_block::QueryBlock;
use crate::types::{CandidatePair, CandidateSimInfo, ClonePair, ScanOutcome, Validation};

/// Confirms or rejects candidate pairs with an early-terminating overlap scan.
pub struct SimilarityValidator<S: ?Sized> {
    source: Arc<S>,
}

impl<S: BlockSource + ?Sized> SimilarityValidator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Validates one candidate, fetching its token list first when needed.
    pub fn validate(&self, mut pair: CandidatePair) -> Validation {
        if !ForwardLookup::new(self.source.as_ref()).hydrate(&mut pair) {
            return Validation::Missing;
        }
        let tokens = match pair.candidate_tokens.as_deref() {
            Some(tokens) if !tokens.trim().is_empty() => tokens,
            _ => {
                warn!(candidate_id = %pair.candidate_id, "candidate_tokens_empty");
                return Validation::Missing;
            }
        };

        match overlap_scan(
            &pair.query,
            tokens,
            pair.candidate_size,
            pair.computed_threshold,
            &mut pair.sim_info,
        ) {
            Ok(ScanOutcome::Accepted { similarity }) => {
                debug!(
                    query_id = %pair.query.id(),
                    candidate_id = %pair.candidate_id,
                    similarity,
                    "clone_confirmed"
                );
                Validation::Clone(ClonePair::new(pair.query.id(), pair.candidate_id))
            }
            Ok(outcome) => Validation::Rejected(outcome),
            Err(err) => {
                warn!(
                    query_id = %pair.query.id(),
                    candidate_id = %pair.candidate_id,
                    error = %err,
                    "candidate_frame_malformed"
                );
                Validation::Malformed(err)
            }
        }
    }
}

/// Position-filtered overlap scan of a serialized candidate against a query.
///
/// Candidate frames must be in the same canonical order as the query's
/// tokens. Before each frame the scan checks that the threshold is still
/// reachable: `threshold <= similarity + min(query tokens after the last
/// query match, candidate tokens after the last candidate match)`. A frame
/// matching a query token adds `min(query frequency, candidate frequency)`.
/// The scan stops as soon as the similarity reaches the threshold.
pub fn overlap_scan(
    query: &QueryBlock,
    candidate_tokens: &str,
    candidate_size: u64,
    computed_threshold: u64,
    sim: &mut CandidateSimInfo,
) -> Result<ScanOutcome, FrameError> {
    let mut tokens_seen_in_candidate = 0u64;

    for frame in frames(candidate_tokens) {
        let frame = frame?;
        let query_left = query.size().saturating_sub(sim.query_match_position);
        let candidate_left = candidate_size.saturating_sub(sim.candidate_match_position);
        if computed_threshold > sim.similarity + query_left.min(candidate_left) {
            return Ok(ScanOutcome::Pruned {
                similarity: sim.similarity,
            });
        }

        tokens_seen_in_candidate += u64::from(frame.frequency);
        if tokens_seen_in_candidate <= sim.candidate_match_position {
            continue;
        }

        let hit = if sim.query_match_position < query.prefix_map_size() {
            query
                .prefix_map()
                .get(frame.token)
                .or_else(|| query.suffix_map().get(frame.token))
        } else {
            query.suffix_map().get(frame.token)
        };

        if let Some(info) = hit {
            sim.similarity += u64::from(info.frequency.min(frame.frequency));
            sim.query_match_position = info.position;
            sim.candidate_match_position = tokens_seen_in_candidate;
            if sim.similarity >= computed_threshold {
                return Ok(ScanOutcome::Accepted {
                    similarity: sim.similarity,
                });
            }
        }
    }

    Ok(ScanOutcome::Exhausted {
        similarity: sim.similarity,
    })
}

/// Size of the multiset intersection of two bags, without any pruning.
pub fn full_overlap(a: &TokenBag, b: &TokenBag) -> u64 {
    let (small, large) = if a.unique() <= b.unique() { (a, b) } else { (b, a) };
    small
        .iter()
        .map(|(token, freq)| u64::from(freq.min(large.frequency(token))))
        .sum()
}
