use anyhow::{Context, Result};
use clap::Parser;
use edna::catalog::Catalog;
use edna::config::Settings;
use edna::index::SharedIndex;
use edna::server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edna")]
#[command(about = "Directory-browsing music server", long_about = None)]
struct Cli {
    /// Path to the TOML config file (defaults to ./edna.toml if present)
    #[arg(short, long, env = "EDNA_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(host) = cli.host {
        settings.server.host = host;
    }

    // RUST_LOG wins over the configured directive
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.server.log))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    settings.validate().map_err(anyhow::Error::msg)?;

    let sources = settings.usable_sources();
    if sources.is_empty() {
        anyhow::bail!("No usable music directories configured");
    }

    tracing::info!("Starting edna");
    for source in &sources {
        tracing::info!("Serving {} as /{}/", source.dir.display(), source.name);
    }

    let catalog = Catalog::new(sources.clone(), &settings.listing);

    let index = if settings.index.refresh_secs > 0 {
        let shared = Arc::new(SharedIndex::new(sources, catalog.scanner().clone()));
        Arc::clone(&shared).spawn_refresh(Duration::from_secs(settings.index.refresh_secs));
        tracing::info!(
            "Name index enabled, refreshing every {}s",
            settings.index.refresh_secs
        );
        Some(shared)
    } else {
        None
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let default_host = match settings.server.host.as_str() {
        "0.0.0.0" | "::" | "[::]" => format!("localhost:{}", settings.server.port),
        _ => addr.clone(),
    };

    let app = server::create_router(Arc::new(catalog), index, default_host);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
