use std::sync::Arc;

use index::IndexError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokens::FrameError;

use crate::query_block::QueryBlock;

/// In-block frequency and cumulative position of one query token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub frequency: u32,
    /// Cumulative token count up to and including this token, in canonical order.
    pub position: u64,
}

/// A query token in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedToken {
    pub token: String,
    pub frequency: u32,
    pub position: u64,
    pub global_frequency: u64,
}

impl OrderedToken {
    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            frequency: self.frequency,
            position: self.position,
        }
    }
}

/// Running state of one overlap scan.
///
/// `similarity` never decreases and both positions only move forward while a
/// candidate is being validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateSimInfo {
    pub similarity: u64,
    pub query_match_position: u64,
    pub candidate_match_position: u64,
}

/// A block proposed for validation against one query.
///
/// Created once per distinct candidate id per query, consumed by exactly one
/// validator.
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub query: Arc<QueryBlock>,
    pub candidate_id: String,
    /// Serialized `token:frequency` list, fetched lazily from the forward index.
    pub candidate_tokens: Option<String>,
    pub candidate_size: u64,
    pub computed_threshold: u64,
    pub sim_info: CandidateSimInfo,
}

impl CandidatePair {
    pub fn new(query: Arc<QueryBlock>, candidate_id: impl Into<String>, candidate_size: u64) -> Self {
        let computed_threshold = query.computed_threshold();
        Self {
            query,
            candidate_id: candidate_id.into(),
            candidate_tokens: None,
            candidate_size,
            computed_threshold,
            sim_info: CandidateSimInfo::default(),
        }
    }
}

/// A confirmed clone: `(query block id, candidate block id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClonePair {
    pub query_id: String,
    pub candidate_id: String,
}

impl ClonePair {
    pub fn new(query_id: impl Into<String>, candidate_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            candidate_id: candidate_id.into(),
        }
    }
}

/// How an overlap scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Similarity reached the threshold.
    Accepted { similarity: u64 },
    /// The position filter proved the threshold unreachable.
    Pruned { similarity: u64 },
    /// Every frame was scanned without reaching the threshold.
    Exhausted { similarity: u64 },
}

impl ScanOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanOutcome::Accepted { .. })
    }

    pub fn similarity(&self) -> u64 {
        match *self {
            ScanOutcome::Accepted { similarity }
            | ScanOutcome::Pruned { similarity }
            | ScanOutcome::Exhausted { similarity } => similarity,
        }
    }
}

/// Result of validating one candidate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Clone(ClonePair),
    Rejected(ScanOutcome),
    /// The stored token list could not be decoded.
    Malformed(FrameError),
    /// The candidate has no usable forward document.
    Missing,
}

/// How the minimum overlap of a query block is derived from its size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Fraction of the query size in (0, 1], rounded up.
    Fraction(f32),
    /// Fixed token count.
    Absolute(u32),
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Fraction(0.8)
    }
}

const FRACTION_SCALE: u64 = 1_000_000;

impl ThresholdPolicy {
    pub fn validate(&self) -> Result<(), MatchError> {
        match *self {
            ThresholdPolicy::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(
                MatchError::InvalidConfig(format!("threshold fraction {f} must lie in (0, 1]")),
            ),
            ThresholdPolicy::Absolute(0) => Err(MatchError::InvalidConfig(
                "absolute threshold must be at least 1".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Minimum overlap for a block of `size` tokens, at least 1.
    ///
    /// Fractions are applied in millionths so `0.8 * 10` is exactly 8.
    pub fn computed_threshold(&self, size: u64) -> u64 {
        let raw = match *self {
            ThresholdPolicy::Fraction(f) => {
                let scaled = (f64::from(f) * FRACTION_SCALE as f64).round() as u64;
                scaled.saturating_mul(size).div_ceil(FRACTION_SCALE)
            }
            ThresholdPolicy::Absolute(n) => u64::from(n),
        };
        raw.max(1)
    }
}

/// Matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    #[serde(default = "MatcherConfig::default_version")]
    pub version: u32,
    #[serde(default)]
    pub threshold: ThresholdPolicy,
}

impl MatcherConfig {
    pub(crate) fn default_version() -> u32 {
        1
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.version == 0 {
            return Err(MatchError::InvalidConfig(
                "matcher version must be >= 1".into(),
            ));
        }
        self.threshold.validate()
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            version: Self::default_version(),
            threshold: ThresholdPolicy::default(),
        }
    }
}

/// Errors surfaced by the matcher.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Invalid configuration.
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    /// A query block needs an id.
    #[error("query block requires a non-empty id")]
    EmptyQueryId,
    /// A query block needs at least one token.
    #[error("query block `{0}` has no tokens")]
    EmptyQuery(String),
    /// The threshold cannot be met by a block of this size, or is zero.
    #[error("threshold {threshold} is outside 1..={size} for query block `{id}`")]
    ThresholdOutOfRange { id: String, threshold: u64, size: u64 },
    /// Index read failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
