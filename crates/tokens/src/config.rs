//! Configuration for the block tokenizer.
//!
//! [`TokenizerConfig`] decides which character sequences split tokens, which
//! are deleted outright and how comments are recognised. The defaults follow
//! C-family syntax (Java, C, C++, JavaScript).
//!
//! # Versioning
//!
//! Token bags produced under different configurations are not comparable. The
//! `version` field is stored alongside an index so a mismatch can be detected
//! before two corpora are joined.
//!
//! ```rust
//! use tokens::TokenizerConfig;
//!
//! let config = TokenizerConfig::default();
//! assert_eq!(config.version, 1);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Configuration for [`tokenize_block`](crate::tokenize_block).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Tokenizer behaviour version. Must be >= 1.
    pub version: u32,
    /// Sequences replaced by whitespace (punctuation and operators).
    pub separators: Vec<String>,
    /// Sequences deleted without leaving a gap.
    pub noise: Vec<String>,
    /// Marker that starts a comment running to the end of the line.
    pub line_comment: Option<String>,
    /// Opening and closing markers of a block comment.
    pub block_comment: Option<(String, String)>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        let separators = [
            ",", "(", ")", "{", "}", "[", "]", "<", ">", "=", ".", "+", "-", "*", "/", "%", "!",
            "?", "&", "^", "|",
        ];
        Self {
            version: 1,
            separators: separators.iter().map(|s| s.to_string()).collect(),
            noise: vec![";".into(), "@@::@@".into(), "@#@".into()],
            line_comment: Some("//".into()),
            block_comment: Some(("/*".into(), "*/".into())),
        }
    }
}

impl TokenizerConfig {
    /// Checks the configuration for values the tokenizer cannot work with.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.version == 0 {
            return Err(TokenError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.separators.iter().chain(self.noise.iter()).any(String::is_empty) {
            return Err(TokenError::InvalidConfig(
                "separators and noise sequences must be non-empty".into(),
            ));
        }
        if matches!(&self.line_comment, Some(marker) if marker.is_empty()) {
            return Err(TokenError::InvalidConfig(
                "line comment marker must be non-empty".into(),
            ));
        }
        if matches!(&self.block_comment, Some((open, close)) if open.is_empty() || close.is_empty())
        {
            return Err(TokenError::InvalidConfig(
                "block comment markers must be non-empty".into(),
            ));
        }
        Ok(())
    }
}
