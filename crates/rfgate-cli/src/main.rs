use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rfgate_auth::{HttpAuthorizer, TagCache};
use rfgate_cli::{Args, api};
use rfgate_network::{ControlHandle, Supervisor};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let antenna = args.antenna();
    info!(%antenna, version = env!("CARGO_PKG_VERSION"), "Starting rfgate");

    let supervisor_config = args
        .supervisor_config()
        .context("invalid READ_FILTER_HEX")?;
    let authorizer = HttpAuthorizer::new(args.authorizer_config())
        .context("invalid authorization service configuration")?;
    let cache = Arc::new(TagCache::new(authorizer, args.cache_config()));

    let (supervisor, handle) =
        Supervisor::new(antenna, supervisor_config, args.gate_config(), cache);

    let listener = TcpListener::bind(args.api_bind)
        .await
        .with_context(|| format!("failed to bind API on {}", args.api_bind))?;
    info!(addr = %args.api_bind, "Manual control API listening");

    let app = api::router(handle.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    tokio::spawn(shutdown_on_ctrl_c(handle));

    let result = supervisor.run().await;
    api_task.abort();

    if let Err(e) = result {
        // Exit non-zero so an external supervisor restarts the process cold
        error!(error = %e, "Connection supervisor gave up");
        std::process::exit(1);
    }

    info!("rfgate stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: ControlHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C");
        return;
    }
    info!("Shutdown requested");
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Supervisor already stopped");
    }
}
