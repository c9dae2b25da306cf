use serde::{Deserialize, Serialize};

use crate::{CompressionCodec, INDEX_SCHEMA_VERSION};

/// Forward-index entry for one code block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlockDocument {
    /// Schema version for backward compatibility when deserializing.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub id: String,
    /// Enclosing unit (file or project) the block was cut from.
    pub parent_id: String,
    /// Total token count.
    pub size: u64,
    /// Distinct token count.
    pub unique: u32,
    /// `token:frequency` frames joined by `::`, in canonical order.
    pub tokens: String,
    /// Arbitrary metadata associated with the block (JSON).
    #[serde(with = "crate::metadata_serde")]
    pub metadata: serde_json::Value,
}

/// One inverted-index entry: a block containing the token, and how often.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Posting {
    pub block_id: String,
    /// In-block frequency of the token.
    pub frequency: u32,
    /// Total token count of the block.
    pub block_size: u64,
}

impl Posting {
    pub fn new(block_id: impl Into<String>, frequency: u32, block_size: u64) -> Self {
        Self {
            block_id: block_id.into(),
            frequency,
            block_size,
        }
    }
}

/// Index-wide facts written once per build. Stored without compression so
/// the codec can be read before anything else.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexManifest {
    pub schema_version: u16,
    pub compression: CompressionCodec,
    pub block_count: u64,
    pub token_count: u64,
}

impl IndexManifest {
    pub(crate) fn new(compression: CompressionCodec, block_count: u64, token_count: u64) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            compression,
            block_count,
            token_count,
        }
    }
}

const fn default_schema_version() -> u16 {
    INDEX_SCHEMA_VERSION
}

/// Key layout inside the backend.
pub(crate) mod keys {
    pub(crate) const DOC: &str = "doc/";
    pub(crate) const POSTINGS: &str = "post/";
    pub(crate) const DOC_FREQUENCY: &str = "df/";
    pub(crate) const MANIFEST: &str = "meta/manifest";

    pub(crate) fn doc(id: &str) -> String {
        format!("{DOC}{id}")
    }

    pub(crate) fn postings(token: &str) -> String {
        format!("{POSTINGS}{token}")
    }

    pub(crate) fn doc_frequency(token: &str) -> String {
        format!("{DOC_FREQUENCY}{token}")
    }
}
