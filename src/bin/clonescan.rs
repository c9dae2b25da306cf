//! clonescan CLI: tokenize sources, build a block index and report clones.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clonescan::{
    BackendConfig, BlockIndex, BlockRecord, CloneScanConfig, CloneSink, PipelineReport,
    ThresholdPolicy, TokenBag, WriterSink, build_block_index, detect_clones, read_block_records,
    search_index, tokenize_block,
};
use tracing::info;

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Token-bag code clone detection
#[derive(Parser)]
#[command(name = "clonescan")]
#[command(version = VERSION)]
#[command(long_about = "
Find near-miss code clones by comparing token bags.

Common Usage:

  # Turn source files into a token file, one block per file
  clonescan tokenize src/*.java --output blocks.tokens

  # Find clones among all blocks of a token file
  clonescan detect --tokens blocks.tokens

  # Build a persistent index once, then search it
  clonescan index --tokens corpus.tokens --db corpus.redb
  clonescan search --tokens queries.tokens --db corpus.redb --output clones.csv
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of validator threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Override the similarity threshold as a fraction of the query size
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Override the log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize source files into token-file lines, one block per file
    Tokenize(TokenizeArgs),

    /// Build a persistent block index from a token file
    Index(IndexArgs),

    /// Search the blocks of a token file against an existing index
    Search(SearchArgs),

    /// Find clones among all blocks of a token file
    Detect(DetectArgs),

    /// Print the default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,
}

#[derive(Args)]
struct TokenizeArgs {
    /// Source files to tokenize
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Parent id written on every line
    #[arg(long, default_value = "1")]
    parent_id: String,

    /// Block id of the first file; later files count up from it
    #[arg(long, default_value_t = 1)]
    first_id: u64,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct IndexArgs {
    /// Token file to index
    #[arg(short, long)]
    tokens: PathBuf,

    /// Database file to create
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    /// Token file holding the query blocks
    #[arg(short, long)]
    tokens: PathBuf,

    /// Existing database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DetectArgs {
    /// Token file to scan
    #[arg(short, long)]
    tokens: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    init_tracing(&cli, &cfg);

    match cli.command {
        Commands::Tokenize(args) => tokenize_command(args, &cfg),
        Commands::Index(args) => index_command(args, &cfg),
        Commands::Search(args) => search_command(args, &cfg),
        Commands::Detect(args) => detect_command(args, &cfg),
        Commands::PrintDefaultConfig => {
            let yaml = serde_yaml::to_string(&CloneScanConfig::default())
                .context("failed to render default config")?;
            print!("{yaml}");
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CloneScanConfig> {
    let mut cfg = match &cli.config {
        Some(path) => CloneScanConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CloneScanConfig::default(),
    };
    if let Some(workers) = cli.workers {
        cfg.pipeline.workers = workers;
    }
    if let Some(fraction) = cli.threshold {
        cfg.matcher.threshold = ThresholdPolicy::Fraction(fraction);
    }
    match cli.log_format {
        Some(LogFormat::Json) => cfg.logging.format = "json".into(),
        Some(LogFormat::Pretty) => cfg.logging.format = "pretty".into(),
        None => {}
    }
    if cli.verbose {
        cfg.logging.level = "debug".into();
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &CloneScanConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));
    // Logs go to stderr so clone pairs on stdout stay machine-readable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(io::stderr);
    if cfg.logging.is_json() {
        builder.json().init();
    } else if cli.verbose {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

fn tokenize_command(args: TokenizeArgs, cfg: &CloneScanConfig) -> anyhow::Result<()> {
    let mut out = open_output(args.output.as_deref())?;
    for (offset, path) in args.files.iter().enumerate() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let tokens = tokenize_block(&text, &cfg.tokenizer)?;
        let block_id = args.first_id + offset as u64;
        info!(path = %path.display(), block_id, tokens = tokens.len(), "source_tokenized");
        let record = BlockRecord::new(
            args.parent_id.clone(),
            block_id.to_string(),
            TokenBag::from_tokens(tokens),
        );
        writeln!(out, "{}", record.to_line())?;
    }
    out.flush()?;
    Ok(())
}

fn index_command(args: IndexArgs, cfg: &CloneScanConfig) -> anyhow::Result<()> {
    let records = read_token_file(&args.tokens)?;
    let mut index_cfg = cfg.index.to_index_config()?;
    if let Some(db) = &args.db {
        index_cfg = index_cfg.with_backend(BackendConfig::redb(db.to_string_lossy()));
    }
    if matches!(index_cfg.backend, BackendConfig::InMemory) {
        bail!("index needs a database path: pass --db or set index.path with backend redb");
    }
    let index = build_block_index(records, index_cfg)?;
    index.flush()?;
    info!(blocks = index.block_count(), "index_written");
    Ok(())
}

fn search_command(args: SearchArgs, cfg: &CloneScanConfig) -> anyhow::Result<()> {
    let records = read_token_file(&args.tokens)?;
    let mut index_cfg = cfg.index.to_index_config()?;
    if let Some(db) = &args.db {
        index_cfg = index_cfg.with_backend(BackendConfig::redb(db.to_string_lossy()));
    }
    let index = BlockIndex::open(index_cfg).context("failed to open block index")?;
    let mut sink = WriterSink::new(open_output(args.output.as_deref())?);
    let report = search_index(
        Arc::new(index),
        &records,
        &cfg.matcher,
        cfg.pipeline.clone(),
        &mut sink,
    )?;
    finish(&mut sink, &report)
}

fn detect_command(args: DetectArgs, cfg: &CloneScanConfig) -> anyhow::Result<()> {
    let records = read_token_file(&args.tokens)?;
    let detection = detect_clones(records, cfg)?;
    let mut sink = WriterSink::new(open_output(args.output.as_deref())?);
    for pair in &detection.clones {
        sink.report(pair)?;
    }
    finish(&mut sink, &detection.report)
}

fn finish<W: Write>(sink: &mut WriterSink<W>, report: &PipelineReport) -> anyhow::Result<()> {
    sink.flush()?;
    if report.sink_errors > 0 {
        bail!("{} clone pairs could not be written", report.sink_errors);
    }
    info!(
        clones = report.clones,
        candidates = report.candidates,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "scan_complete"
    );
    Ok(())
}

fn read_token_file(path: &Path) -> anyhow::Result<Vec<BlockRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (n, record) in read_block_records(BufReader::new(file)).enumerate() {
        let record = record
            .with_context(|| format!("{}: bad block record #{}", path.display(), n + 1))?;
        records.push(record);
    }
    info!(path = %path.display(), blocks = records.len(), "token_file_loaded");
    Ok(records)
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    })
}
