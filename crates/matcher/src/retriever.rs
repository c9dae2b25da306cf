use std::sync::Arc;

use hashbrown::HashSet;
use index::{compile_term, BlockSource};
use tracing::{debug, warn};

use crate::query_block::QueryBlock;
use crate::types::CandidatePair;

/// Counters for one retrieval pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalStats {
    /// Prefix tokens looked up.
    pub prefix_tokens: usize,
    /// Token occurrences covered by the looked-up prefix.
    pub terms_seen: u64,
    /// Distinct candidates emitted.
    pub candidates: usize,
    /// Prefix tokens that could not be compiled into a lookup.
    pub skipped_terms: usize,
    /// Lookups the index failed to answer.
    pub failed_lookups: usize,
}

/// Proposes candidate blocks for a query through its prefix tokens.
///
/// Each prefix token's postings are read in canonical order and every block
/// id is emitted once, the first time it appears. The query's own id is never
/// a candidate.
pub struct CandidateRetriever<S: ?Sized> {
    source: Arc<S>,
}

impl<S: BlockSource + ?Sized> CandidateRetriever<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Streams candidates for `query` into `emit`.
    ///
    /// Unresolvable tokens and failed lookups are logged and skipped; they
    /// never abort the pass.
    pub fn retrieve(
        &self,
        query: &Arc<QueryBlock>,
        emit: &mut dyn FnMut(CandidatePair),
    ) -> RetrievalStats {
        let mut stats = RetrievalStats::default();
        let mut seen: HashSet<String> = HashSet::new();

        for token in query.prefix_tokens() {
            stats.prefix_tokens += 1;
            let term = match compile_term(&token.token) {
                Ok(term) => term,
                Err(err) => {
                    warn!(query_id = %query.id(), token = %token.token, error = %err, "query_token_unresolvable");
                    stats.skipped_terms += 1;
                    stats.terms_seen += u64::from(token.frequency);
                    continue;
                }
            };

            match self.source.lookup_postings(&term) {
                Ok(postings) => {
                    for posting in postings {
                        if posting.block_id == query.id() || seen.contains(&posting.block_id) {
                            continue;
                        }
                        seen.insert(posting.block_id.clone());
                        stats.candidates += 1;
                        emit(CandidatePair::new(
                            Arc::clone(query),
                            posting.block_id,
                            posting.block_size,
                        ));
                    }
                }
                Err(err) => {
                    warn!(query_id = %query.id(), token = %token.token, error = %err, "postings_lookup_failed");
                    stats.failed_lookups += 1;
                }
            }
            stats.terms_seen += u64::from(token.frequency);
        }

        debug!(
            query_id = %query.id(),
            prefix_tokens = stats.prefix_tokens,
            candidates = stats.candidates,
            "candidates_retrieved"
        );
        stats
    }

    /// Collects every candidate for `query`.
    pub fn collect(&self, query: &Arc<QueryBlock>) -> (Vec<CandidatePair>, RetrievalStats) {
        let mut out = Vec::new();
        let stats = self.retrieve(query, &mut |pair| out.push(pair));
        (out, stats)
    }
}
