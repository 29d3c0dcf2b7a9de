//! reqdb: build and query a hybrid requirement index.
//!
//! ```bash
//! reqdb ingest ./requirements/            # JSON files, one record or an array each
//! reqdb query "payment security" -n 5
//! reqdb query "encrypt" --mode keyword --json
//! reqdb status
//! ```

mod output;
mod source;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reqdb_core::config::{expand_path, resolve_with_base, Config, Settings};
use reqdb_core::traits::Embedder;
use reqdb_core::types::SearchMode;
use reqdb_embed::{embed_lenient, get_default_embedder};
use reqdb_hybrid::{build_searchable_text, RequirementIndex};

#[derive(Parser)]
#[command(name = "reqdb", version, about = "Hybrid BM25 + vector search over requirement records")]
struct Cli {
    /// Config file (default: config.toml and config.<RUST_ENV>.toml, then APP_* variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index directory, overriding `data.index_dir`
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the index with the requirements found under PATH
    Ingest { path: PathBuf },
    /// Search the index
    Query {
        text: String,
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        /// Maximum number of results (default: retrieval.default_top_k)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show index statistics
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load()?,
    };
    let settings = config.settings().context("invalid configuration")?;
    // A relative `data.index_dir` in an explicit config file is relative to that file.
    let index_dir = match (&cli.index_dir, &cli.config) {
        (Some(dir), _) => dir.clone(),
        (None, Some(file)) => {
            resolve_with_base(file.parent().unwrap_or_else(|| Path::new(".")), &settings.data.index_dir)
        }
        (None, None) => expand_path(&settings.data.index_dir),
    };

    match cli.command {
        Command::Ingest { path } => ingest(&settings, &index_dir, &path),
        Command::Query { text, mode, limit, json } => {
            query(&settings, &index_dir, &text, mode, limit.unwrap_or(settings.retrieval.default_top_k), json)
        }
        Command::Status { json } => status(&settings, &index_dir, json),
    }
}

fn open_index(settings: &Settings, index_dir: &Path) -> Result<RequirementIndex> {
    RequirementIndex::open(index_dir, settings).with_context(|| format!("opening index at {}", index_dir.display()))
}

fn ingest(settings: &Settings, index_dir: &Path, path: &Path) -> Result<()> {
    let requirements = source::load_requirements(path)?;
    if requirements.is_empty() {
        bail!("no requirements found under {}", path.display());
    }
    info!(count = requirements.len(), source = %path.display(), "loaded requirements");

    let embedder = get_default_embedder(&settings.embedding);
    let texts: Vec<String> = requirements.iter().map(build_searchable_text).collect();

    let pb = ProgressBar::new(texts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} embedded ({percent}%)")?
            .progress_chars("#>-"),
    );
    let outcome = embed_lenient(embedder.as_ref(), &texts, settings.embedding.batch_size, |n| pb.inc(n as u64));
    pb.finish_and_clear();
    if outcome.degraded > 0 {
        warn!(degraded = outcome.degraded, "some requirements were indexed with zero vectors");
    }

    let index = open_index(settings, index_dir)?;
    let report = index.ingest(&requirements, outcome.embeddings)?;
    println!(
        "Indexed {} requirements into {} (dimension {}, {} terms) in {:.2?}",
        report.documents,
        index_dir.display(),
        report.dimension.unwrap_or(0),
        report.vocabulary_size,
        report.elapsed
    );
    Ok(())
}

fn query(settings: &Settings, index_dir: &Path, text: &str, mode: SearchMode, limit: usize, json: bool) -> Result<()> {
    let index = open_index(settings, index_dir)?;
    let embedding = match mode {
        SearchMode::Keyword => Vec::new(),
        SearchMode::Hybrid | SearchMode::Vector => get_default_embedder(&settings.embedding)
            .embed_batch(&[text.to_string()])
            .context("embedding query")?
            .into_iter()
            .next()
            .context("embedding provider returned no vector for the query")?,
    };
    let hits = index.search(mode, text, &embedding, limit)?;
    let rendered = if json { output::format_json(text, mode, &hits) } else { output::format_human(text, &hits) };
    println!("{rendered}");
    Ok(())
}

fn status(settings: &Settings, index_dir: &Path, json: bool) -> Result<()> {
    let stats = open_index(settings, index_dir)?.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("index: {}\n{}", index_dir.display(), output::format_stats(&stats));
    }
    Ok(())
}
