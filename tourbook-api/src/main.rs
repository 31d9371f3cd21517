use anyhow::Context;
use std::net::SocketAddr;
use tourbook_api::{app, bootstrap};
use tourbook_store::app_config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tourbook API on port {}", config.server.port);

    let services = bootstrap::build_services(&config).await?;
    let state = bootstrap::app_state(&config, services.engine, services.redis);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bootstrap::flush_notifications(services.notifier).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
