//! Pipeline coordinator.
//!
//! Binds candidate retrieval, similarity validation and clone reporting:
//!
//! ```text
//! queries --rayon pool--> retriever --candidate queue--> validators --report queue--> sink
//! ```
//!
//! Both queues are bounded MPMC channels created per run and handed to the
//! threads that use them. Validators poll the candidate queue with a timeout,
//! so an idle queue is never an error, and block on the report queue when the
//! sink falls behind. A [`ShutdownHandle`] stops new retrieval; candidates
//! already taken by a validator are finished, queued ones are counted as
//! abandoned, and every reported clone still reaches the sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use index::BlockSource;
use matcher::{
    CandidatePair, CandidateRetriever, ClonePair, QueryBlock, ScanOutcome, SimilarityValidator,
    Validation,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, debug, info, span, warn};

use crate::sink::{CloneSink, SinkError};

/// Errors that stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error("failed to start {role} thread: {source}")]
    Spawn {
        role: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build retriever pool: {0}")]
    ThreadPool(String),
    #[error("{0} thread panicked")]
    Panicked(&'static str),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Sizing of the worker pool and queues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Validator threads.
    #[serde(default = "PipelineConfig::default_workers")]
    pub workers: usize,
    /// Threads in the rayon pool running candidate retrieval.
    #[serde(default = "PipelineConfig::default_retriever_threads")]
    pub retriever_threads: usize,
    #[serde(default = "PipelineConfig::default_queue_capacity")]
    pub candidate_queue_capacity: usize,
    #[serde(default = "PipelineConfig::default_queue_capacity")]
    pub report_queue_capacity: usize,
    /// How long an idle validator waits on the candidate queue before
    /// re-checking for shutdown.
    #[serde(default = "PipelineConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    fn default_workers() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    fn default_retriever_threads() -> usize {
        2
    }

    fn default_queue_capacity() -> usize {
        1024
    }

    fn default_poll_interval_ms() -> u64 {
        50
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retriever_threads(mut self, threads: usize) -> Self {
        self.retriever_threads = threads;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.candidate_queue_capacity = capacity;
        self.report_queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if self.retriever_threads == 0 {
            return Err(PipelineError::InvalidConfig(
                "retriever_threads must be greater than zero".into(),
            ));
        }
        if self.candidate_queue_capacity == 0 || self.report_queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacities must be greater than zero".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            retriever_threads: Self::default_retriever_threads(),
            candidate_queue_capacity: Self::default_queue_capacity(),
            report_queue_capacity: Self::default_queue_capacity(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Cloneable switch that asks a running pipeline to stop.
///
/// The switch stays set once triggered: every later run of the same pipeline
/// skips all of its queries until [`ShutdownHandle::reset`] is called.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous trigger so the pipeline can run again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Totals of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Queries whose retrieval ran.
    pub queries: u64,
    /// Queries skipped because shutdown was requested first.
    pub queries_skipped: u64,
    /// Candidate pairs produced by retrieval. Each one is either validated
    /// or counted as abandoned.
    pub candidates: u64,
    pub clones: u64,
    /// Candidates stopped early by the position filter.
    pub pruned: u64,
    /// Candidates scanned to the end without reaching the threshold.
    pub exhausted: u64,
    pub missing: u64,
    pub malformed: u64,
    /// Candidates never validated because of shutdown.
    pub abandoned: u64,
    pub skipped_terms: u64,
    pub failed_lookups: u64,
    /// Clones the sink accepted.
    pub delivered: u64,
    pub sink_errors: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct RetrievalCounters {
    queries: AtomicU64,
    queries_skipped: AtomicU64,
    candidates: AtomicU64,
    abandoned: AtomicU64,
    skipped_terms: AtomicU64,
    failed_lookups: AtomicU64,
}

#[derive(Debug, Default)]
struct WorkerStats {
    clones: u64,
    pruned: u64,
    exhausted: u64,
    missing: u64,
    malformed: u64,
    abandoned: u64,
}

#[derive(Debug, Default)]
struct SinkStats {
    delivered: u64,
    errors: u64,
}

/// Runs query blocks through retrieval and validation against one index.
pub struct ClonePipeline<S: ?Sized> {
    source: Arc<S>,
    cfg: PipelineConfig,
    shutdown: ShutdownHandle,
}

impl<S: BlockSource + ?Sized> ClonePipeline<S> {
    pub fn new(source: Arc<S>, cfg: PipelineConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;
        Ok(Self {
            source,
            cfg,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Handle that stops this pipeline from another thread. A triggered
    /// handle also stops later runs until it is reset.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Searches every query and reports confirmed clones to `sink`.
    ///
    /// Returns once retrieval has finished (or was stopped), every validator
    /// has exited and the sink has been flushed. If the shutdown handle is
    /// already triggered, every query is skipped.
    pub fn run<K>(
        &self,
        queries: &[Arc<QueryBlock>],
        sink: &mut K,
    ) -> Result<PipelineReport, PipelineError>
    where
        K: CloneSink + Send,
    {
        let span = span!(
            Level::INFO,
            "pipeline.run",
            queries = queries.len(),
            workers = self.cfg.workers
        );
        let _guard = span.enter();
        let start = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.retriever_threads)
            .thread_name(|i| format!("clone-retriever-{i}"))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        let (candidate_tx, candidate_rx) =
            bounded::<CandidatePair>(self.cfg.candidate_queue_capacity);
        let (report_tx, report_rx) = bounded::<ClonePair>(self.cfg.report_queue_capacity);
        let retriever = CandidateRetriever::new(Arc::clone(&self.source));
        let counters = RetrievalCounters::default();

        let (worker_stats, sink_stats) = thread::scope(|scope| {
            let sink_handle = thread::Builder::new()
                .name("clone-sink".into())
                .spawn_scoped(scope, move || drain_reports(report_rx, sink))
                .map_err(|source| PipelineError::Spawn {
                    role: "sink",
                    source,
                })?;

            let mut workers = Vec::with_capacity(self.cfg.workers);
            for worker_idx in 0..self.cfg.workers {
                let rx = candidate_rx.clone();
                let tx = report_tx.clone();
                let validator = SimilarityValidator::new(Arc::clone(&self.source));
                let shutdown = self.shutdown.clone();
                let poll = self.cfg.poll_interval();
                let handle = thread::Builder::new()
                    .name(format!("clone-validator-{worker_idx}"))
                    .spawn_scoped(scope, move || {
                        validate_candidates(rx, tx, &validator, &shutdown, poll)
                    })
                    .map_err(|source| PipelineError::Spawn {
                        role: "validator",
                        source,
                    })?;
                workers.push(handle);
            }

            // The report queue closes once every worker has exited. The
            // coordinator keeps a candidate receiver to count leftovers.
            drop(report_tx);

            let poll = self.cfg.poll_interval();
            pool.install(|| {
                queries.par_iter().for_each(|query| {
                    retrieve_into(
                        &retriever,
                        query,
                        &candidate_tx,
                        &self.shutdown,
                        poll,
                        &counters,
                    )
                });
            });
            drop(candidate_tx);

            let mut totals = WorkerStats::default();
            for handle in workers {
                let stats = handle
                    .join()
                    .map_err(|_| PipelineError::Panicked("validator"))?;
                totals.merge(stats);
            }
            while candidate_rx.try_recv().is_ok() {
                totals.abandoned += 1;
            }
            let sink_stats = sink_handle
                .join()
                .map_err(|_| PipelineError::Panicked("sink"))?;
            Ok::<_, PipelineError>((totals, sink_stats))
        })?;

        let report = PipelineReport {
            queries: counters.queries.load(Ordering::Relaxed),
            queries_skipped: counters.queries_skipped.load(Ordering::Relaxed),
            candidates: counters.candidates.load(Ordering::Relaxed),
            clones: worker_stats.clones,
            pruned: worker_stats.pruned,
            exhausted: worker_stats.exhausted,
            missing: worker_stats.missing,
            malformed: worker_stats.malformed,
            abandoned: worker_stats.abandoned + counters.abandoned.load(Ordering::Relaxed),
            skipped_terms: counters.skipped_terms.load(Ordering::Relaxed),
            failed_lookups: counters.failed_lookups.load(Ordering::Relaxed),
            delivered: sink_stats.delivered,
            sink_errors: sink_stats.errors,
            elapsed: start.elapsed(),
        };

        info!(
            queries = report.queries,
            candidates = report.candidates,
            clones = report.clones,
            pruned = report.pruned,
            abandoned = report.abandoned,
            sink_errors = report.sink_errors,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline_finished"
        );
        Ok(report)
    }
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.clones += other.clones;
        self.pruned += other.pruned;
        self.exhausted += other.exhausted;
        self.missing += other.missing;
        self.malformed += other.malformed;
        self.abandoned += other.abandoned;
    }
}

fn retrieve_into<S: BlockSource + ?Sized>(
    retriever: &CandidateRetriever<S>,
    query: &Arc<QueryBlock>,
    candidate_tx: &Sender<CandidatePair>,
    shutdown: &ShutdownHandle,
    poll: Duration,
    counters: &RetrievalCounters,
) {
    if shutdown.is_triggered() {
        counters.queries_skipped.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let stats = retriever.retrieve(query, &mut |pair| {
        counters.candidates.fetch_add(1, Ordering::Relaxed);
        if !offer(candidate_tx, pair, shutdown, poll) {
            counters.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    });
    counters.queries.fetch_add(1, Ordering::Relaxed);
    counters
        .skipped_terms
        .fetch_add(stats.skipped_terms as u64, Ordering::Relaxed);
    counters
        .failed_lookups
        .fetch_add(stats.failed_lookups as u64, Ordering::Relaxed);
}

/// Enqueues `pair`, waiting while the queue is full. Gives up once shutdown
/// is requested.
fn offer(
    tx: &Sender<CandidatePair>,
    mut pair: CandidatePair,
    shutdown: &ShutdownHandle,
    poll: Duration,
) -> bool {
    loop {
        if shutdown.is_triggered() {
            return false;
        }
        match tx.send_timeout(pair, poll) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => pair = back,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn validate_candidates<S: BlockSource + ?Sized>(
    rx: Receiver<CandidatePair>,
    tx: Sender<ClonePair>,
    validator: &SimilarityValidator<S>,
    shutdown: &ShutdownHandle,
    poll: Duration,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        if shutdown.is_triggered() {
            while rx.try_recv().is_ok() {
                stats.abandoned += 1;
            }
            break;
        }
        let pair = match rx.recv_timeout(poll) {
            Ok(pair) => pair,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match validator.validate(pair) {
            Validation::Clone(clone) => {
                stats.clones += 1;
                // Blocks while the report queue is full.
                if tx.send(clone).is_err() {
                    warn!("report_queue_closed");
                }
            }
            Validation::Rejected(ScanOutcome::Pruned { .. }) => stats.pruned += 1,
            Validation::Rejected(_) => stats.exhausted += 1,
            Validation::Missing => stats.missing += 1,
            Validation::Malformed(_) => stats.malformed += 1,
        }
    }
    debug!(
        clones = stats.clones,
        abandoned = stats.abandoned,
        "validator_exited"
    );
    stats
}

fn drain_reports<K: CloneSink>(rx: Receiver<ClonePair>, sink: &mut K) -> SinkStats {
    let mut stats = SinkStats::default();
    for clone in rx.iter() {
        match sink.report(&clone) {
            Ok(()) => stats.delivered += 1,
            Err(err) => {
                warn!(
                    query_id = %clone.query_id,
                    candidate_id = %clone.candidate_id,
                    error = %err,
                    "clone_report_failed"
                );
                stats.errors += 1;
            }
        }
    }
    if let Err(err) = sink.flush() {
        warn!(error = %err, "sink_flush_failed");
        stats.errors += 1;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        for cfg in [
            PipelineConfig::default().with_workers(0),
            PipelineConfig::default().with_retriever_threads(0),
            PipelineConfig::default().with_queue_capacity(0),
            PipelineConfig {
                poll_interval_ms: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                cfg.validate(),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn shutdown_handle_is_shared() {
        let handle = ShutdownHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_triggered());
        clone.trigger();
        assert!(handle.is_triggered());
    }
}
