use std::hint::black_box;
use std::sync::Arc;

use clonescan::{
    BlockRecord, BlockSource, ClonePipeline, IndexConfig, PipelineConfig, ThresholdPolicy,
    TokenBag, VecSink, build_block_index, build_queries,
};
use criterion::{Criterion, criterion_group, criterion_main};

const VOCAB: usize = 400;

fn corpus(blocks: usize) -> Vec<BlockRecord> {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    (0..blocks)
        .map(|i| {
            let mut bag = TokenBag::new();
            for _ in 0..rng.usize(20..120) {
                // Skewed draw so a few tokens are common, as in real code.
                let t = rng.usize(..VOCAB).min(rng.usize(..VOCAB));
                bag.insert(&format!("t{t}"));
            }
            BlockRecord::new("1", i.to_string(), bag)
        })
        .collect()
}

fn build_bench(c: &mut Criterion) {
    let records = corpus(2_000);
    c.bench_function("build_in_memory_index_2k", |b| {
        b.iter(|| {
            let index = build_block_index(black_box(records.clone()), IndexConfig::default())
                .expect("index builds");
            black_box(index);
        });
    });
}

fn pipeline_bench(c: &mut Criterion) {
    let records = corpus(2_000);
    let index = Arc::new(
        build_block_index(records.clone(), IndexConfig::default()).expect("index builds"),
    );
    let queries = build_queries(
        &records,
        index.frequency_table(),
        &ThresholdPolicy::Fraction(0.8),
    );

    let mut group = c.benchmark_group("self_join_2k");
    group.sample_size(10);
    for workers in [1, 4] {
        let cfg = PipelineConfig::default().with_workers(workers);
        let pipeline = ClonePipeline::new(Arc::clone(&index), cfg).expect("valid config");
        group.bench_function(format!("workers_{workers}"), |b| {
            b.iter(|| {
                let mut sink = VecSink::new();
                let report = pipeline.run(black_box(&queries), &mut sink).expect("run");
                black_box(report);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, build_bench, pipeline_bench);
criterion_main!(benches);
