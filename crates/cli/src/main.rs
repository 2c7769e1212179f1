use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use kb_cli::candidates::{
    collect_candidates, CandidateReport, DEFAULT_CANDIDATES, DEFAULT_RETRIEVAL_TOP_K,
};
use kb_cli::config::Settings;
use kb_cli::eval::{run_benchmark, Benchmark, EvalOptions, EvalReport, EvalSummary};
use kb_cli::output::{OutputFormat, QueryReport, StatsReport};
use kb_cli::report::render_eval_report;
use kb_corpus::RecordSet;
use kb_search::{rank_prepared, PreparedQuery, RankOptions, SourceFilter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Lexical retrieval over the Unitree G1 knowledge index", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Settings file (TOML or JSON). Defaults to ./kb.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank index records against a question
    Query(QueryArgs),

    /// List distinct candidate sources for agent-side selection (JSON)
    Candidates(CandidatesArgs),

    /// Evaluate retrieval quality on a benchmark file
    Eval(EvalArgs),

    /// Show record counts by source type
    Stats(StatsArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// Question text
    question: String,

    /// Path to the JSONL knowledge index
    #[arg(long)]
    index: Option<PathBuf>,

    /// Number of results to return (default: 8)
    #[arg(long)]
    top_k: Option<usize>,

    /// Restrict results to this source type (repeatable)
    #[arg(long = "source-type")]
    source_type: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Keep only the best match per source path
    #[arg(long)]
    unique: bool,

    /// Include the per-factor score breakdown
    #[arg(long)]
    explain: bool,
}

#[derive(Args)]
struct CandidatesArgs {
    /// Question text
    question: String,

    /// Path to the JSONL knowledge index
    #[arg(long)]
    index: Option<PathBuf>,

    /// Retriever depth before candidates are cut
    #[arg(long, default_value_t = DEFAULT_RETRIEVAL_TOP_K)]
    top_k: usize,

    /// Maximum number of candidates to emit
    #[arg(long, default_value_t = DEFAULT_CANDIDATES)]
    candidates: usize,

    /// Restrict candidates to this source type (repeatable)
    #[arg(long = "source-type")]
    source_type: Vec<String>,
}

#[derive(Args)]
struct EvalArgs {
    /// Benchmark file (JSON or YAML)
    #[arg(long)]
    benchmark: Option<PathBuf>,

    /// Path to the JSONL knowledge index
    #[arg(long)]
    index: Option<PathBuf>,

    /// Top-K per query (default: 8)
    #[arg(long)]
    top_k: Option<usize>,

    /// Write the JSON report to this path
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Write the Markdown report to this path
    #[arg(long)]
    md_out: Option<PathBuf>,

    /// Pass-rate threshold used by --strict (default: 0.80)
    #[arg(long)]
    fail_below: Option<f64>,

    /// Exit non-zero when the pass rate is below the threshold
    #[arg(long)]
    strict: bool,

    /// Rank every chunk instead of one result per source
    #[arg(long)]
    no_dedupe: bool,

    /// Keep the benchmark file itself in the candidate pool
    #[arg(long)]
    allow_leakage: bool,

    /// Print the full JSON report to stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatsArgs {
    /// Path to the JSONL knowledge index
    #[arg(long)]
    index: Option<PathBuf>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers.
    let json_output = match &cli.command {
        Commands::Query(args) => args.format == OutputFormat::Json,
        Commands::Candidates(_) => true,
        Commands::Eval(args) => args.json,
        Commands::Stats(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let settings = Settings::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Query(args) => run_query(args, &settings).await?,
        Commands::Candidates(args) => run_candidates(args, &settings).await?,
        Commands::Eval(args) => run_eval(args, &settings).await?,
        Commands::Stats(args) => run_stats(args, &settings).await?,
    }

    Ok(())
}

async fn load_index(path: &Path) -> Result<RecordSet> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!(
            "Index not found: {}. Build it first with scripts/build_knowledge_index.py or pass --index",
            path.display()
        );
    }
    RecordSet::load(path)
        .await
        .with_context(|| format!("Failed to load index {}", path.display()))
}

fn source_filter(labels: &[String]) -> Option<SourceFilter> {
    let filter = SourceFilter::from_labels(labels);
    (!filter.is_empty()).then_some(filter)
}

async fn run_query(args: QueryArgs, settings: &Settings) -> Result<()> {
    let index = settings.index(args.index);
    let top_k = settings.top_k(args.top_k);
    let records = load_index(&index).await?;

    let filter = source_filter(&args.source_type);
    let prepared = PreparedQuery::new(&args.question);
    let matches = rank_prepared(
        &records,
        &prepared,
        RankOptions {
            top_k,
            filter: filter.as_ref(),
            unique: args.unique,
        },
    );
    log::debug!("{} matches for {:?}", matches.len(), args.question);

    let report = QueryReport::new(&args.question, top_k, &prepared, &matches, args.explain);
    let rendered = report.render(args.format)?;
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
    Ok(())
}

async fn run_candidates(args: CandidatesArgs, settings: &Settings) -> Result<()> {
    let index = settings.index(args.index);
    let records = load_index(&index).await?;

    let filter = source_filter(&args.source_type);
    let candidates = collect_candidates(
        &records,
        &args.question,
        args.top_k,
        args.candidates,
        filter.as_ref(),
    );
    let report = CandidateReport {
        question: &args.question,
        top_k: args.top_k,
        candidates,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_eval(args: EvalArgs, settings: &Settings) -> Result<()> {
    let benchmark_path = settings.benchmark(args.benchmark);
    let index = settings.index(args.index);
    let top_k = settings.top_k(args.top_k);
    let fail_below = settings.fail_below(args.fail_below);

    let benchmark = Benchmark::load(&benchmark_path).await?;
    let records = load_index(&index).await?;

    let options = EvalOptions {
        top_k,
        dedupe: !args.no_dedupe,
        allow_leakage: args.allow_leakage,
        benchmark_path: benchmark_path.to_string_lossy().into_owned(),
    };
    let results = run_benchmark(&records, &benchmark, &options);
    let summary = EvalSummary::from_results(&results);

    let report = EvalReport {
        timestamp_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        benchmark: benchmark_path.display().to_string(),
        name: benchmark.name.clone(),
        index: index.display().to_string(),
        top_k,
        dedupe: options.dedupe,
        allow_leakage: options.allow_leakage,
        fail_below,
        summary,
        results,
    };

    if let Some(path) = settings.json_out(args.json_out) {
        write_artifact(&path, &serde_json::to_string_pretty(&report)?).await?;
        log::info!("Wrote retrieval eval JSON: {}", path.display());
    }
    if let Some(path) = settings.md_out(args.md_out) {
        write_artifact(&path, &render_eval_report(&report)).await?;
        log::info!("Wrote retrieval eval MD: {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", summary.line());
    }

    if args.strict && !summary.meets(fail_below) {
        log::warn!(
            "Pass rate {:.2}% is below threshold {:.2}%",
            summary.pass_rate * 100.0,
            fail_below * 100.0
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn write_artifact(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn run_stats(args: StatsArgs, settings: &Settings) -> Result<()> {
    let index = settings.index(args.index);
    let records = load_index(&index).await?;
    let stats = StatsReport::new(index.display().to_string(), &records);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats.render_text());
    }
    Ok(())
}
