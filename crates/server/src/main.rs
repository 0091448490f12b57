use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use convert_common::{config::ServerAppConfig, logging};
use convert_server::{storage, worker, AppState};

#[derive(Parser)]
#[command(name = "convert-server", about = "HTTP file conversion service", version)]
struct Args {
    /// Path to server.toml; a missing file means built-in defaults
    #[arg(env = "CONVERT_CONFIG", default_value = "/etc/convert-anything/server.toml")]
    config: PathBuf,

    /// Override `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerAppConfig::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let _log_guard = logging::init(&config.log, "convert_server=info,tower_http=info")?;
    if !args.config.exists() {
        tracing::warn!("config {} not found, using defaults", args.config.display());
    }

    storage::ensure_dirs(&config.storage)
        .await
        .context("creating storage directories")?;
    convert_media::set_ffmpeg_path(config.conversion.ffmpeg_path.clone());

    tokio::spawn(worker::start_retention_sweeper(config.storage.clone()));

    let bind = config.server.bind.clone();
    tracing::info!(
        "uploads in {}, outputs in {}",
        config.storage.upload_dir.display(),
        config.storage.output_dir.display()
    );
    let app = convert_server::app(Arc::new(AppState { config }));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;

    tracing::info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("installing Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
