//! Token-bag clone detection over source code blocks.
//!
//! The workspace is split the way the data flows:
//!
//! - `tokens` turns source text into token bags and reads/writes token files.
//! - `index` stores blocks as forward documents plus per-token postings and
//!   keeps the global token frequency table.
//! - `matcher` orders query tokens canonically, retrieves candidates through
//!   the prefix filter and confirms them with the position filter.
//! - this crate runs the concurrent pipeline and owns configuration.
//!
//! ```
//! use clonescan::{BlockRecord, CloneScanConfig, TokenBag, detect_clones};
//!
//! let a = TokenBag::from_tokens(["int", "x", "x", "y", "return"]);
//! let b = TokenBag::from_tokens(["int", "x", "x", "y", "break"]);
//! let records = vec![BlockRecord::new("1", "10", a), BlockRecord::new("1", "11", b)];
//!
//! let mut cfg = CloneScanConfig::default();
//! cfg.pipeline.workers = 2;
//! let outcome = detect_clones(records, &cfg).unwrap();
//! assert_eq!(outcome.clones.len(), 2);
//! ```

pub mod config;
mod pipeline;
mod sink;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

pub use config::{CloneScanConfig, ConfigLoadError, IndexYamlConfig, LoggingYamlConfig};
pub use index::{
    BackendConfig, BlockDocument, BlockIndex, BlockIndexBuilder, BlockSource, CompressionCodec,
    CompressionConfig, IdQuery, IndexConfig, IndexError, Posting, QueryError, TermQuery,
    TokenFrequencyTable, compile_id, compile_term,
};
pub use matcher::{
    CandidatePair, CandidateRetriever, ClonePair, MatchError, MatcherConfig, QueryBlock,
    ScanOutcome, SimilarityValidator, ThresholdPolicy, Validation, full_overlap,
};
pub use pipeline::{ClonePipeline, PipelineConfig, PipelineError, PipelineReport, ShutdownHandle};
pub use sink::{CloneSink, SinkError, VecSink, WriterSink};
pub use tokens::{
    BlockRecord, TokenBag, TokenError, TokenizerConfig, parse_block_line, read_block_records,
    tokenize_block,
};

/// Errors surfaced by the top-level entry points.
#[derive(Debug, Error)]
pub enum CloneScanError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Clones found by [`detect_clones`] together with the run's totals.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Ordered pairs sorted by query id, then candidate id.
    pub clones: Vec<ClonePair>,
    pub report: PipelineReport,
}

/// Builds a block index from token-file records.
pub fn build_block_index<I>(records: I, cfg: IndexConfig) -> Result<BlockIndex, CloneScanError>
where
    I: IntoIterator<Item = BlockRecord>,
{
    let mut builder = BlockIndexBuilder::new(cfg);
    for record in records {
        builder.add_record(record)?;
    }
    Ok(builder.build()?)
}

/// Turns records into query blocks ordered by `table`.
///
/// Blocks that cannot form a query (empty bag, or a threshold larger than the
/// block) are logged and left out.
pub fn build_queries(
    records: &[BlockRecord],
    table: &TokenFrequencyTable,
    policy: &ThresholdPolicy,
) -> Vec<Arc<QueryBlock>> {
    let mut queries = Vec::with_capacity(records.len());
    for record in records {
        match QueryBlock::with_policy(record.block_id.clone(), &record.bag, table, policy) {
            Ok(query) => queries.push(Arc::new(query)),
            Err(err) => debug!(block_id = %record.block_id, error = %err, "query_block_skipped"),
        }
    }
    queries
}

/// Searches `records` against an existing index.
pub fn search_index<S, K>(
    source: Arc<S>,
    records: &[BlockRecord],
    matcher_cfg: &MatcherConfig,
    pipeline_cfg: PipelineConfig,
    sink: &mut K,
) -> Result<PipelineReport, CloneScanError>
where
    S: BlockSource + ?Sized,
    K: CloneSink + Send,
{
    matcher_cfg.validate()?;
    let queries = build_queries(records, source.frequency_table(), &matcher_cfg.threshold);
    info!(
        records = records.len(),
        queries = queries.len(),
        "queries_built"
    );
    let pipeline = ClonePipeline::new(source, pipeline_cfg)?;
    Ok(pipeline.run(&queries, sink)?)
}

/// Self-join: indexes `records` in memory and searches every block against
/// all others.
///
/// Both orientations of a clone are reported. The `index` section's
/// compression and batching apply; its backend is ignored.
pub fn detect_clones(
    records: Vec<BlockRecord>,
    cfg: &CloneScanConfig,
) -> Result<Detection, CloneScanError> {
    cfg.validate()?;
    let index_cfg = cfg
        .index
        .to_index_config()?
        .with_backend(BackendConfig::in_memory());
    let mut builder = BlockIndexBuilder::new(index_cfg);
    for record in &records {
        builder.add_block(
            record.parent_id.clone(),
            record.block_id.clone(),
            record.bag.clone(),
            serde_json::Value::Null,
        )?;
    }
    let index = Arc::new(builder.build()?);

    let mut sink = VecSink::new();
    let report = search_index(
        index,
        &records,
        &cfg.matcher,
        cfg.pipeline.clone(),
        &mut sink,
    )?;
    Ok(Detection {
        clones: sink.sorted(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, tokens: &[&str]) -> BlockRecord {
        BlockRecord::new("p", id, TokenBag::from_tokens(tokens.iter().copied()))
    }

    #[test]
    fn build_queries_skips_unusable_blocks() {
        let records = vec![
            record("1", &["a", "b", "c"]),
            record("2", &[]),
            record("3", &["a"]),
        ];
        let mut table = TokenFrequencyTable::new();
        for r in &records {
            table.record_block(&r.bag);
        }
        let queries = build_queries(&records, &table, &ThresholdPolicy::Absolute(2));
        let ids: Vec<&str> = queries.iter().map(|q| q.id()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn detect_clones_reports_both_orientations() {
        let records = vec![
            record("10", &["a", "b", "c", "d", "e"]),
            record("11", &["a", "b", "c", "d", "f"]),
            record("12", &["v", "w", "x", "y", "z"]),
        ];
        let mut cfg = CloneScanConfig::default();
        cfg.pipeline.workers = 2;
        let detection = detect_clones(records, &cfg).unwrap();
        assert_eq!(
            detection.clones,
            vec![ClonePair::new("10", "11"), ClonePair::new("11", "10")]
        );
        assert_eq!(detection.report.clones, 2);
        assert_eq!(detection.report.queries, 3);
    }
}
