pub mod api; // HTTP surface
pub mod authorization; // Role → capability gate
pub mod board; // Referral + dashboard operations
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod storage; // Attachment object storage

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber (`RUST_LOG`, else the default filter).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Open state, serve until Ctrl-C, then drain.
pub async fn run(config: config::Config) -> Result<(), String> {
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let addr = config.bind_addr;
    let core = core_state::CoreState::open(config).map_err(|e| format!("Startup failed: {e}"))?;
    let mut server = api::start_api_server(Arc::new(core), addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }

    server.shutdown();
    server.stopped().await;
    Ok(())
}
