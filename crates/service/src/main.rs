use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use regroup_embed::{load_config, EmbeddingClient, DEFAULT_CONFIG};
use regroup_service::{router, AppState};

fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let config_path =
        PathBuf::from(std::env::var("REGROUP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string()));
    let config = load_config(&config_path)?;
    // The blocking http client must be built outside the async runtime.
    let embed_client = EmbeddingClient::from_settings(&config.embedding)?;
    info!("embedder" = %embed_client.describe(), "configured embeddings");
    let state = Arc::new(AppState::new(Box::new(embed_client), config.clustering)?);
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .context("invalid BIND_ADDR")?;
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?
        .block_on(serve(state, addr))
}

async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<(), anyhow::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
