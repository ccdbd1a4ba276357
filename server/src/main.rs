use anyhow::Result;
use axum::Router;
use clap::Parser;
use docseek_core::{Language, SearchConfig, SearchService};
use docseek_server::{build_app, cors_layer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, env = "DOCSEEK_INDEX_DIR", default_value = "./docseek_index")]
    index: PathBuf,
    /// Directory indexed by POST /index
    #[arg(long, env = "DOCSEEK_DATA_DIR", default_value = "./data")]
    data: PathBuf,
    /// Analyzer language for a newly created index
    #[arg(long, env = "DOCSEEK_LANGUAGE", default_value = "english")]
    language: Language,
    /// Host to bind
    #[arg(long, env = "DOCSEEK_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "DOCSEEK_PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, env = "DOCSEEK_DEFAULT_PAGE_SIZE", default_value_t = 20)]
    default_page_size: usize,
    #[arg(long, env = "DOCSEEK_MAX_PAGE_SIZE", default_value_t = 50)]
    max_page_size: usize,
    #[arg(long, env = "DOCSEEK_HIGHLIGHT_MAX_CHARS", default_value_t = 250)]
    highlight_max_chars: usize,
    #[arg(long, env = "DOCSEEK_HIGHLIGHT_SURROUND", default_value_t = 40)]
    highlight_surround: usize,
    #[arg(long, env = "DOCSEEK_WRITER_MEMORY_MB", default_value_t = 256)]
    writer_memory_mb: usize,
    #[arg(long, env = "DOCSEEK_WRITER_TIMEOUT_SECS", default_value_t = 300)]
    writer_timeout_secs: u64,
    /// When set, POST /index requires a matching X-ADMIN-TOKEN header
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
    /// Comma-separated allowed origins; any origin when unset
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
}

impl Args {
    fn config(&self) -> SearchConfig {
        SearchConfig {
            index_dir: self.index.clone(),
            data_dir: self.data.clone(),
            language: self.language,
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            highlight_max_chars: self.highlight_max_chars,
            highlight_surround: self.highlight_surround,
            writer_memory_mb: self.writer_memory_mb,
            writer_timeout_secs: self.writer_timeout_secs,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let service = Arc::new(SearchService::new(args.config()));
    let store = service.open_or_create()?;
    tracing::info!(
        index = %store.path().display(),
        data = %args.data.display(),
        language = %store.analyzer().language(),
        documents = store.read_snapshot().num_docs(),
        "index ready"
    );

    let app: Router = build_app(service, args.admin_token.clone(), cors_layer(args.cors_allow_origin.as_deref()));
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
