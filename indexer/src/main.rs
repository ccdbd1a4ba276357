use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docseek_core::{Language, SearchConfig, SearchFilters, SearchRequest, SearchService};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "docseek-indexer")]
#[command(about = "Build, inspect and query a docseek full-text index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IndexArgs {
    /// Index directory
    #[arg(long, env = "DOCSEEK_INDEX_DIR", default_value = "./docseek_index")]
    index: PathBuf,
    /// Analyzer language used when a new index is created (english, portuguese)
    #[arg(long, env = "DOCSEEK_LANGUAGE", default_value = "english")]
    language: Language,
}

impl IndexArgs {
    fn config(&self) -> SearchConfig {
        SearchConfig { index_dir: self.index.clone(), language: self.language, ..Default::default() }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index every supported file under a directory (new files are added,
    /// known paths are replaced)
    Build {
        /// Directory to walk
        #[arg(long, env = "DOCSEEK_DATA_DIR", default_value = "./data")]
        input: PathBuf,
        #[command(flatten)]
        index: IndexArgs,
        /// Writer memory budget before spilling partial segments
        #[arg(long, env = "DOCSEEK_WRITER_MEMORY_MB", default_value_t = 256)]
        memory_mb: usize,
        /// Seconds to wait for another running batch
        #[arg(long, env = "DOCSEEK_WRITER_TIMEOUT_SECS", default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Print document count and size of an index
    Stats {
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Run a query against an index and print one page of results
    Search {
        #[command(flatten)]
        index: IndexArgs,
        /// Query string; "quoted phrases" and -exclusions are supported
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, env = "DOCSEEK_DEFAULT_PAGE_SIZE", default_value_t = 20)]
        page_size: usize,
        /// Comma-separated file types, e.g. txt,md
        #[arg(long)]
        file_types: Option<String>,
        #[arg(long)]
        min_score: Option<f32>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, index, memory_mb, timeout_secs } => {
            let config = SearchConfig { writer_memory_mb: memory_mb, writer_timeout_secs: timeout_secs, ..index.config() };
            build_index(config, input)
        }
        Commands::Stats { index } => {
            let stats = SearchService::new(index.config()).stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Search { index, query, page, page_size, file_types, min_score } => {
            let filters = SearchFilters {
                file_types: file_types.map(|s| s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()),
                min_score,
                ..Default::default()
            };
            let mut request = SearchRequest::new(query).page(page, page_size);
            if !filters.is_empty() {
                request = request.filters(filters);
            }
            let response = SearchService::new(index.config()).search(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

fn build_index(config: SearchConfig, input: PathBuf) -> Result<()> {
    anyhow::ensure!(input.is_dir(), "input {} is not a directory", input.display());
    let service = SearchService::new(config);
    let report = service
        .index_directory(&input)
        .with_context(|| format!("indexing {} into {}", input.display(), service.config().index_dir.display()))?;
    for err in &report.errors {
        tracing::warn!(%err, "file skipped");
    }
    tracing::info!(
        new = report.indexed_count,
        updated = report.updated_count,
        secs = report.elapsed_seconds,
        "index build complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
