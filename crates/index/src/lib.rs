//! # Block Index
//!
//! Storage side of clone detection. Every code block is kept twice: once in an
//! inverted index (token -> postings of `(block id, in-block frequency)`) and
//! once in a forward index (block id -> its serialized `token:frequency` list,
//! size and metadata). A global [`TokenFrequencyTable`] records in how many
//! blocks each token occurs and defines the canonical token order used by the
//! matcher on both sides of a comparison.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: storage goes through the [`IndexBackend`] trait.
//!   An in-memory `BTreeMap` backend ships for tests and one-shot runs, and a
//!   redb backend (feature `backend-redb`, on by default) persists to disk.
//! - **Compact Storage**: values are bincode-encoded and compressed with Zstd
//!   unless [`CompressionCodec::None`] is selected.
//! - **Stateless Query Compilation**: [`compile_term`] and [`compile_id`] are
//!   pure functions, so any number of threads can query a shared index.
//!
//! ## Example Usage
//!
//! ```
//! use index::{compile_term, BlockIndexBuilder, BlockSource, IndexConfig};
//! use tokens::TokenBag;
//!
//! let mut builder = BlockIndexBuilder::new(IndexConfig::new());
//! builder
//!     .add_block("file-1", "b1", TokenBag::from_tokens(["a", "b", "a"]), serde_json::Value::Null)
//!     .unwrap();
//! let index = builder.build().unwrap();
//!
//! let postings = index.lookup_postings(&compile_term("a").unwrap()).unwrap();
//! assert_eq!(postings[0].block_id, "b1");
//! assert_eq!(postings[0].frequency, 2);
//! ```

mod backend;
mod block_index;
mod builder;
mod document;
mod frequency;
mod query;
mod source;

pub use backend::{BackendConfig, InMemoryBackend, IndexBackend};
#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use block_index::BlockIndex;
pub use builder::BlockIndexBuilder;
pub use document::{BlockDocument, IndexManifest, Posting};
pub use frequency::{RankedToken, TokenFrequencyTable};
pub use query::{compile_id, compile_term, IdQuery, QueryError, TermQuery};
pub use source::BlockSource;

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zstd::{decode_all, encode_all};

/// Bump this value whenever the on-disk layout of documents or postings changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

mod metadata_serde {
    use serde::de::Error as DeError;
    use serde::ser::Error as SerError;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn serialize<S>(value: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = serde_json::to_vec(value).map_err(SerError::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        serde_json::from_slice(&bytes).map_err(DeError::custom)
    }
}

/// Compression codec options for index storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionCodec {
    /// No compression (useful for debugging or when storage is not a concern).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    /// The compression codec to use (None or Zstd).
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub(crate) fn uncompressed() -> Self {
        Self::new(CompressionCodec::None, 0)
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }

    /// Encodes and compresses a value for storage in the backend.
    pub(crate) fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(value, standard())?;
        self.compress(&encoded)
    }

    /// Decompresses and decodes a value read from the backend.
    pub(crate) fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, IndexError> {
        let decompressed = self.decompress(data)?;
        let (value, _) = decode_from_slice(&decompressed, standard())?;
        Ok(value)
    }
}

/// Config for building or opening a block index.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Backend storage configuration (in-memory or redb).
    pub backend: BackendConfig,
    /// Compression settings for stored documents and postings.
    pub compression: CompressionConfig,
    /// Number of key-value entries written per backend batch while building.
    pub write_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            compression: CompressionConfig::default(),
            write_batch_size: 10_000,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size.max(1);
        self
    }
}

/// Custom error type
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Schema mismatch: index has version {found}, expected {expected}")]
    Schema { found: u16, expected: u16 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate block id: {0}")]
    DuplicateBlock(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Compression(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codec_roundtrip_for_each_compression() {
        let doc = BlockDocument {
            schema_version: INDEX_SCHEMA_VERSION,
            id: "b1".into(),
            parent_id: "p".into(),
            size: 3,
            unique: 2,
            tokens: "x:1::y:2".into(),
            metadata: json!({ "path": "src/lib.rs", "start": 10 }),
        };
        for codec in [CompressionCodec::None, CompressionCodec::Zstd] {
            let cfg = CompressionConfig::default().with_codec(codec);
            let bytes = cfg.encode(&doc).expect("encode");
            let back: BlockDocument = cfg.decode(&bytes).expect("decode");
            assert_eq!(back, doc);
        }
    }

    #[test]
    fn zstd_shrinks_repetitive_postings() {
        let zstd = CompressionConfig::default();
        let plain = CompressionConfig::default().with_codec(CompressionCodec::None);
        let postings = vec![Posting::new("block-0000", 4, 12); 256];
        let packed = zstd.encode(&postings).unwrap();
        let raw = plain.encode(&postings).unwrap();
        assert!(packed.len() < raw.len());
        assert_eq!(zstd.decode::<Vec<Posting>>(&packed).unwrap(), postings);
    }

    #[test]
    fn write_batch_size_is_at_least_one() {
        assert_eq!(IndexConfig::new().with_write_batch_size(0).write_batch_size, 1);
    }
}
