use anyhow::Result;
use clap::Parser;
use engine::{Engine, EngineConfig};
use server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Documents per flush
    #[arg(long)]
    batch_size: Option<usize>,
    /// Milliseconds between periodic flushes
    #[arg(long)]
    flush_interval_ms: Option<u64>,
    /// Maximum queued, uncommitted documents
    #[arg(long)]
    queue_capacity: Option<usize>,
    /// Searches allowed to execute at once
    #[arg(long)]
    search_workers: Option<usize>,
    /// Per-search time budget in milliseconds
    #[arg(long)]
    search_timeout_ms: Option<u64>,
    /// Token required by admin endpoints
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(v) = self.batch_size { config.batch_size = v; }
        if let Some(v) = self.flush_interval_ms { config.flush_interval_ms = v; }
        if let Some(v) = self.queue_capacity { config.queue_capacity = v; }
        if let Some(v) = self.search_workers { config.search_workers = v; }
        if let Some(v) = self.search_timeout_ms { config.search_timeout_ms = v; }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let engine = Arc::new(Engine::new(args.engine_config())?);
    let app = build_app(Arc::clone(&engine), args.admin_token.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    // Stopping the engine joins the committer thread, so keep it off the runtime.
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    Ok(())
}
