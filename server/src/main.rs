use std::{net::SocketAddr, sync::Arc};

use pool_core::{PoolBackend, PoolConfig, RoutingContext};
use server::{app, config::ServerConfig, AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so a RUST_LOG set there reaches the filter
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting TTS pool server...");

    let config = ServerConfig::from_env();

    let pool_config = PoolConfig::from_file(&config.pool_config_path)?.with_env_overrides();
    // One routing context for the whole process; every request shares its gates
    let backend = PoolBackend::from_config(&pool_config, RoutingContext::new())?;
    info!(
        "Loaded {} endpoint(s) from {}",
        backend.orchestrator().pool().len(),
        config.pool_config_path
    );

    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, request_timeout={}s, max_text={}",
        config.port, config.rate_limit_per_minute, config.request_timeout_secs, config.max_text_length
    );

    let state = AppState {
        backend: Arc::new(backend),
        config: config.clone(),
    };
    let app = app(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
