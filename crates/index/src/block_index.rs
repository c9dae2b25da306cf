use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::document::keys;
use crate::{
    compile_id, BlockDocument, BlockSource, CompressionConfig, IdQuery, IndexBackend,
    IndexConfig, IndexError, IndexManifest, Posting, TermQuery, TokenFrequencyTable,
    INDEX_SCHEMA_VERSION,
};

/// A built block index: postings, forward documents and the frequency table.
///
/// The frequency table is loaded into memory on open; postings and documents
/// are read from the backend on demand. Safe to share across threads.
pub struct BlockIndex {
    backend: Box<dyn IndexBackend>,
    compression: CompressionConfig,
    table: TokenFrequencyTable,
    block_count: AtomicU64,
    // Serializes deletes so the count and manifest follow the stored documents.
    delete_lock: Mutex<()>,
}

impl BlockIndex {
    /// Opens an index previously written to a persistent backend.
    ///
    /// A missing or incomplete index is an error; nothing is created.
    pub fn open(cfg: IndexConfig) -> Result<Self, IndexError> {
        let backend = cfg.backend.open_existing()?;
        Self::open_with_backend(cfg, backend)
    }

    /// Opens an index stored in a caller-provided backend.
    pub fn open_with_backend(
        cfg: IndexConfig,
        backend: Box<dyn IndexBackend>,
    ) -> Result<Self, IndexError> {
        let raw = backend
            .get(keys::MANIFEST)?
            .ok_or_else(|| IndexError::NotFound("index manifest missing".into()))?;
        let manifest: IndexManifest = CompressionConfig::uncompressed().decode(&raw)?;
        if manifest.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::Schema {
                found: manifest.schema_version,
                expected: INDEX_SCHEMA_VERSION,
            });
        }

        // The codec recorded at build time wins over the caller's choice.
        let compression = cfg.compression.with_codec(manifest.compression);
        let mut table = TokenFrequencyTable::new();
        backend.scan_prefix(keys::DOC_FREQUENCY, &mut |key, value| {
            let token = &key[keys::DOC_FREQUENCY.len()..];
            let frequency: u64 = compression.decode(value)?;
            table.insert(token.to_string(), frequency);
            Ok(())
        })?;

        if table.len() as u64 != manifest.token_count {
            warn!(
                expected = manifest.token_count,
                loaded = table.len(),
                "frequency_table_size_mismatch"
            );
        }
        info!(
            blocks = manifest.block_count,
            tokens = table.len(),
            "block_index_opened"
        );

        Ok(Self::from_parts(backend, compression, table, manifest))
    }

    pub(crate) fn from_parts(
        backend: Box<dyn IndexBackend>,
        compression: CompressionConfig,
        table: TokenFrequencyTable,
        manifest: IndexManifest,
    ) -> Self {
        Self {
            backend,
            compression,
            table,
            block_count: AtomicU64::new(manifest.block_count),
            delete_lock: Mutex::new(()),
        }
    }

    /// Number of forward documents currently stored.
    pub fn block_count(&self) -> u64 {
        self.block_count.load(Ordering::Relaxed)
    }

    /// Removes a block's forward document.
    ///
    /// Postings and document frequencies are left as they are, so the block
    /// can still be proposed as a candidate; validation then finds no
    /// document and drops it. Returns whether a document was removed.
    pub fn delete_block(&self, id: &str) -> Result<bool, IndexError> {
        let query = compile_id(id)?;
        let _guard = self
            .delete_lock
            .lock()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        if self.backend.get(query.key())?.is_none() {
            return Ok(false);
        }
        self.backend.delete(query.key())?;

        let remaining = match self.block_count.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |count| count.checked_sub(1),
        ) {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!(block = id, "block_count_already_zero");
                0
            }
        };
        let manifest = IndexManifest::new(
            self.compression.codec,
            remaining,
            self.table.len() as u64,
        );
        self.backend.put(
            keys::MANIFEST,
            &CompressionConfig::uncompressed().encode(&manifest)?,
        )?;
        Ok(true)
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }
}

impl BlockSource for BlockIndex {
    fn lookup_postings(&self, query: &TermQuery) -> Result<Vec<Posting>, IndexError> {
        match self.backend.get(query.key())? {
            Some(data) => self.compression.decode(&data),
            None => Ok(Vec::new()),
        }
    }

    fn query_by_exact_id(&self, query: &IdQuery) -> Result<Vec<BlockDocument>, IndexError> {
        match self.backend.get(query.key())? {
            Some(data) => Ok(vec![self.compression.decode(&data)?]),
            None => Ok(Vec::new()),
        }
    }

    fn frequency_table(&self) -> &TokenFrequencyTable {
        &self.table
    }
}
