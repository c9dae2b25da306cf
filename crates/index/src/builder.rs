use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use serde_json::Value;
use tokens::{encode_frames, BlockRecord, TokenBag};
use tracing::{debug, info, span, Level};

use crate::document::keys;
use crate::{
    compile_id, compile_term, BlockDocument, BlockIndex, CompressionConfig, IndexBackend, IndexConfig,
    IndexError, IndexManifest, Posting, TokenFrequencyTable, INDEX_SCHEMA_VERSION,
};

struct PendingBlock {
    parent_id: String,
    id: String,
    bag: TokenBag,
    metadata: Value,
}

/// Collects blocks and writes a complete index in one pass.
///
/// Document frequencies depend on the whole corpus, so nothing is written
/// until [`build`](Self::build): the frequency table is finished first and
/// every forward document is then serialized in its final canonical order.
pub struct BlockIndexBuilder {
    cfg: IndexConfig,
    blocks: Vec<PendingBlock>,
    ids: HashSet<String>,
    table: TokenFrequencyTable,
}

impl BlockIndexBuilder {
    pub fn new(cfg: IndexConfig) -> Self {
        Self {
            cfg,
            blocks: Vec::new(),
            ids: HashSet::new(),
            table: TokenFrequencyTable::new(),
        }
    }

    /// Queues one block. Ids must be non-empty and unique, and every token
    /// must be one [`compile_term`] accepts; otherwise the block could be
    /// indexed under a token no query can look up.
    pub fn add_block(
        &mut self,
        parent_id: impl Into<String>,
        id: impl Into<String>,
        bag: TokenBag,
        metadata: Value,
    ) -> Result<(), IndexError> {
        let id = id.into();
        compile_id(&id)?;
        for token in bag.tokens() {
            compile_term(token)?;
        }
        if !self.ids.insert(id.clone()) {
            return Err(IndexError::DuplicateBlock(id));
        }
        self.table.record_block(&bag);
        self.blocks.push(PendingBlock {
            parent_id: parent_id.into(),
            id,
            bag,
            metadata,
        });
        Ok(())
    }

    /// Queues a block read from a token file.
    pub fn add_record(&mut self, record: BlockRecord) -> Result<(), IndexError> {
        self.add_block(record.parent_id, record.block_id, record.bag, Value::Null)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Document frequencies gathered so far.
    pub fn frequency_table(&self) -> &TokenFrequencyTable {
        &self.table
    }

    /// Creates the configured backend and writes the index into it.
    pub fn build(self) -> Result<BlockIndex, IndexError> {
        let backend = self.cfg.backend.build()?;
        self.build_into(backend)
    }

    /// Writes the index into a caller-provided backend.
    pub fn build_into(self, backend: Box<dyn IndexBackend>) -> Result<BlockIndex, IndexError> {
        let span = span!(Level::INFO, "index.build", blocks = self.blocks.len());
        let _guard = span.enter();
        let start = Instant::now();

        let Self {
            cfg, blocks, table, ..
        } = self;
        let codec = &cfg.compression;
        let batch_size = cfg.write_batch_size.max(1);

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::with_capacity(table.len());
        let mut batch: Vec<(String, Vec<u8>)> = Vec::with_capacity(batch_size);
        let block_count = blocks.len() as u64;

        for block in blocks {
            let size = block.bag.size();
            let ranked = table.order(&block.bag);
            let tokens = encode_frames(ranked.iter().map(|r| (r.token.as_str(), r.frequency)));
            for r in &ranked {
                postings
                    .entry_ref(r.token.as_str())
                    .or_default()
                    .push(Posting::new(block.id.as_str(), r.frequency, size));
            }
            let doc = BlockDocument {
                schema_version: INDEX_SCHEMA_VERSION,
                id: block.id,
                parent_id: block.parent_id,
                size,
                unique: ranked.len() as u32,
                tokens,
                metadata: block.metadata,
            };
            batch.push((keys::doc(&doc.id), codec.encode(&doc)?));
            flush_if_full(backend.as_ref(), &mut batch, batch_size)?;
        }

        for (token, list) in &postings {
            batch.push((keys::postings(token), codec.encode(list)?));
            flush_if_full(backend.as_ref(), &mut batch, batch_size)?;
        }
        debug!(tokens = postings.len(), "postings_written");

        for (token, frequency) in table.iter() {
            batch.push((keys::doc_frequency(token), codec.encode(&frequency)?));
            flush_if_full(backend.as_ref(), &mut batch, batch_size)?;
        }

        // The manifest goes last: an index without one is incomplete and
        // refuses to open.
        let manifest = IndexManifest::new(codec.codec, block_count, table.len() as u64);
        batch.push((
            keys::MANIFEST.to_string(),
            CompressionConfig::uncompressed().encode(&manifest)?,
        ));
        backend.batch_put(batch)?;
        backend.flush()?;

        info!(
            blocks = block_count,
            tokens = table.len(),
            elapsed_micros = start.elapsed().as_micros() as u64,
            "block_index_built"
        );

        Ok(BlockIndex::from_parts(backend, cfg.compression, table, manifest))
    }
}

fn flush_if_full(
    backend: &dyn IndexBackend,
    batch: &mut Vec<(String, Vec<u8>)>,
    batch_size: usize,
) -> Result<(), IndexError> {
    if batch.len() >= batch_size {
        backend.batch_put(std::mem::take(batch))?;
    }
    Ok(())
}
