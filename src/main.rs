// src/main.rs - printforge service entry point
use clap::Parser;
use std::sync::Arc;

use printforge::config::{self, Config};
use printforge::service::ConsolidationService;
use printforge::store::{FsObjectStore, MemoryJobStore, MemoryOrderStore};
use printforge::web;

#[derive(Parser)]
#[command(name = "printforge", about = "3D-print production consolidation service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "printforge.toml")]
    config: String,

    /// Override the configured bind address (host:port).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), printforge::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    tracing::info!("Starting printforge");

    let config = if std::path::Path::new(&args.config).exists() {
        config::load_config(&args.config)?
    } else {
        tracing::warn!("config '{}' not found, using defaults", args.config);
        Config::default()
    };
    tracing::info!("Storage root: {}", config.storage.root);
    tracing::info!(
        "Size ceiling: {} MB, merge deadline: {}s",
        config.consolidation.size_ceiling_mb,
        config.timeouts.merge_secs
    );

    let objects = Arc::new(FsObjectStore::new(config.storage.root.clone()));
    let orders = Arc::new(MemoryOrderStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let service = Arc::new(ConsolidationService::new(objects, orders, jobs, config.clone()));

    let app = web::api::create_router(service);
    let addr = args
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Operator API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
