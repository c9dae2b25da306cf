use index::{compile_id, BlockDocument, BlockSource};
use tracing::warn;

use crate::types::CandidatePair;

/// Forward-index access for validation.
///
/// Failures never propagate: an unresolvable id, a missing document or an
/// ambiguous one is logged and the candidate simply goes unmatched.
pub struct ForwardLookup<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: BlockSource + ?Sized> ForwardLookup<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Returns the single forward document stored for `id`.
    pub fn fetch(&self, id: &str) -> Option<BlockDocument> {
        let query = match compile_id(id) {
            Ok(query) => query,
            Err(err) => {
                warn!(block_id = %id, error = %err, "forward_lookup_unresolvable");
                return None;
            }
        };
        match self.source.query_by_exact_id(&query) {
            Ok(mut docs) if docs.len() == 1 => docs.pop(),
            Ok(docs) if docs.is_empty() => {
                warn!(block_id = %id, "forward_document_missing");
                None
            }
            Ok(docs) => {
                warn!(block_id = %id, matches = docs.len(), "forward_document_ambiguous");
                None
            }
            Err(err) => {
                warn!(block_id = %id, error = %err, "forward_lookup_failed");
                None
            }
        }
    }

    /// Fills in the candidate's token list and size. Returns `false` when no
    /// usable document exists.
    pub fn hydrate(&self, pair: &mut CandidatePair) -> bool {
        if pair.candidate_tokens.is_some() {
            return true;
        }
        match self.fetch(&pair.candidate_id) {
            Some(doc) => {
                pair.candidate_size = doc.size;
                pair.candidate_tokens = Some(doc.tokens);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{
        IdQuery, IndexError, Posting, TermQuery, TokenFrequencyTable, INDEX_SCHEMA_VERSION,
    };
    use std::sync::Arc;
    use tokens::TokenBag;

    use crate::QueryBlock;

    /// Returns `copies` documents for every id, or an error for "broken".
    struct FixedSource {
        copies: usize,
        table: TokenFrequencyTable,
    }

    impl BlockSource for FixedSource {
        fn lookup_postings(&self, _query: &TermQuery) -> Result<Vec<Posting>, IndexError> {
            Ok(Vec::new())
        }

        fn query_by_exact_id(&self, query: &IdQuery) -> Result<Vec<BlockDocument>, IndexError> {
            if query.id() == "broken" {
                return Err(IndexError::backend("unreachable"));
            }
            Ok((0..self.copies)
                .map(|_| BlockDocument {
                    schema_version: INDEX_SCHEMA_VERSION,
                    id: query.id().to_string(),
                    parent_id: "p".into(),
                    size: 2,
                    unique: 1,
                    tokens: "t:2".into(),
                    metadata: serde_json::Value::Null,
                })
                .collect())
        }

        fn frequency_table(&self) -> &TokenFrequencyTable {
            &self.table
        }
    }

    fn source(copies: usize) -> FixedSource {
        FixedSource {
            copies,
            table: TokenFrequencyTable::new(),
        }
    }

    #[test]
    fn single_document_is_returned() {
        let src = source(1);
        let doc = ForwardLookup::new(&src).fetch("b1").unwrap();
        assert_eq!(doc.tokens, "t:2");
    }

    #[test]
    fn missing_ambiguous_and_failing_lookups_yield_none() {
        assert!(ForwardLookup::new(&source(0)).fetch("b1").is_none());
        assert!(ForwardLookup::new(&source(2)).fetch("b1").is_none());
        assert!(ForwardLookup::new(&source(1)).fetch("broken").is_none());
        assert!(ForwardLookup::new(&source(1)).fetch("").is_none());
    }

    #[test]
    fn hydrate_fills_tokens_and_size() {
        let src = source(1);
        let query = QueryBlock::build("q", &TokenBag::from_tokens(["t"]), &src.table, 1).unwrap();
        let mut pair = CandidatePair::new(Arc::new(query), "b1", 0);
        assert!(ForwardLookup::new(&src).hydrate(&mut pair));
        assert_eq!(pair.candidate_tokens.as_deref(), Some("t:2"));
        assert_eq!(pair.candidate_size, 2);

        let mut missing = CandidatePair::new(pair.query.clone(), "b2", 0);
        assert!(!ForwardLookup::new(&source(0)).hydrate(&mut missing));
        assert!(missing.candidate_tokens.is_none());
    }
}
