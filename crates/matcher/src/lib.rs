//! # Clone Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` is the search core of clone detection. Given a code block turned
//! into a [`QueryBlock`], it proposes candidate blocks from the index through
//! the query's rarest tokens and confirms each candidate with an overlap scan
//! that stops as soon as the outcome is known.
//!
//! ## Core Types
//!
//! - [`QueryBlock`]: tokens in canonical order with cumulative positions,
//!   split into a prefix map and a suffix map.
//! - [`CandidateRetriever`]: prefix filtering over a [`BlockSource`].
//! - [`SimilarityValidator`]: position-filtered overlap scan over the
//!   candidate's forward-index entry, see [`overlap_scan`].
//! - [`ThresholdPolicy`]: turns a block size into the minimum overlap.
//! - [`ClonePair`]: a confirmed `(query, candidate)` pair.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use index::{BlockIndexBuilder, BlockSource, IndexConfig};
//! use matcher::{CandidateRetriever, QueryBlock, SimilarityValidator, Validation};
//! use tokens::TokenBag;
//!
//! let mut builder = BlockIndexBuilder::new(IndexConfig::new());
//! builder.add_block("f1", "q", TokenBag::from_tokens(["a", "a", "a", "b", "b", "c"]), serde_json::Value::Null).unwrap();
//! builder.add_block("f2", "x", TokenBag::from_tokens(["a", "a", "b", "b", "d"]), serde_json::Value::Null).unwrap();
//! let index = Arc::new(builder.build().unwrap());
//!
//! let bag = TokenBag::from_tokens(["a", "a", "a", "b", "b", "c"]);
//! let query = Arc::new(QueryBlock::build("q", &bag, index.frequency_table(), 3).unwrap());
//!
//! let retriever = CandidateRetriever::new(index.clone());
//! let validator = SimilarityValidator::new(index);
//! let (pairs, _) = retriever.collect(&query);
//! let clones: Vec<_> = pairs
//!     .into_iter()
//!     .filter_map(|pair| match validator.validate(pair) {
//!         Validation::Clone(clone) => Some(clone),
//!         _ => None,
//!     })
//!     .collect();
//! assert_eq!(clones.len(), 1);
//! assert_eq!(clones[0].candidate_id, "x");
//! ```

mod lookup;
mod query_block;
mod retriever;
mod types;
mod validator;

pub use index::BlockSource;
pub use lookup::ForwardLookup;
pub use query_block::QueryBlock;
pub use retriever::{CandidateRetriever, RetrievalStats};
pub use types::{
    CandidatePair, CandidateSimInfo, ClonePair, MatchError, MatcherConfig, OrderedToken,
    ScanOutcome, ThresholdPolicy, TokenInfo, Validation,
};
pub use validator::{full_overlap, overlap_scan, SimilarityValidator};
