//! Book enrichment server: HTTP surface, worker pool and event consumer in
//! one process.

use std::net::SocketAddr;

use api::{AppConfig, init_app};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let runtime = init_app(&config).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let served = axum::serve(listener, runtime.router())
        .with_graceful_shutdown(shutdown_signal(runtime.state().hub.clone()))
        .await;

    runtime.shutdown().await;
    served?;
    Ok(())
}

/// Resolves on ctrl-c, after closing every live stream.
async fn shutdown_signal(hub: std::sync::Arc<realtime::NotificationHub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    hub.shutdown();
}
