#![allow(dead_code)]

use std::sync::Arc;

use clonescan::{
    BlockIndex, BlockRecord, BlockSource, ClonePair, IndexConfig, PipelineConfig, QueryBlock,
    ThresholdPolicy, TokenBag, build_block_index, build_queries, full_overlap,
};

pub fn record(id: &str, tokens: &[(&str, u32)]) -> BlockRecord {
    let mut bag = TokenBag::new();
    for (token, count) in tokens {
        bag.insert_n(token, *count);
    }
    BlockRecord::new("1", id, bag)
}

/// Q `{a:3, b:2, c:1}` and X `{a:2, b:2, d:1}` share 4 tokens.
pub fn scenario_records() -> Vec<BlockRecord> {
    vec![
        record("Q", &[("a", 3), ("b", 2), ("c", 1)]),
        record("X", &[("a", 2), ("b", 2), ("d", 1)]),
    ]
}

/// Seeded corpus over a small vocabulary so overlaps are common.
pub fn random_corpus(seed: u64, blocks: usize) -> Vec<BlockRecord> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let vocab = [
        "if", "for", "int", "x", "y", "i", "return", "new", "list", "get", "size", "null",
    ];
    (0..blocks)
        .map(|i| {
            let mut bag = TokenBag::new();
            for _ in 0..rng.usize(3..16) {
                bag.insert(vocab[rng.usize(..vocab.len())]);
            }
            BlockRecord::new("1", format!("{}", 100 + i), bag)
        })
        .collect()
}

pub fn in_memory_index(records: &[BlockRecord]) -> Arc<BlockIndex> {
    Arc::new(build_block_index(records.to_vec(), IndexConfig::default()).unwrap())
}

pub fn queries(
    records: &[BlockRecord],
    index: &BlockIndex,
    policy: ThresholdPolicy,
) -> Vec<Arc<QueryBlock>> {
    build_queries(records, index.frequency_table(), &policy)
}

/// Every ordered pair whose unpruned overlap reaches the query's threshold.
pub fn brute_force(records: &[BlockRecord], policy: ThresholdPolicy) -> Vec<ClonePair> {
    let mut expected = Vec::new();
    for q in records {
        let ct = policy.computed_threshold(q.bag.size());
        for c in records {
            if q.block_id != c.block_id && full_overlap(&q.bag, &c.bag) >= ct {
                expected.push(ClonePair::new(q.block_id.clone(), c.block_id.clone()));
            }
        }
    }
    expected.sort();
    expected
}

pub fn small_pipeline(workers: usize) -> PipelineConfig {
    PipelineConfig::default()
        .with_workers(workers)
        .with_retriever_threads(2)
        .with_queue_capacity(8)
}
