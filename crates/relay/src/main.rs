//! Relay service entry point.

use anyhow::{Context, Result};
use bus_client::RedisBus;
use metrics_exporter_prometheus::PrometheusBuilder;
use relay::{create_router, AppState, BusBridge, ConnectionRegistry, Dispatcher, RelayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    info!("Starting relay");
    info!("Configuration:");
    info!("  PORT: {}", config.port);
    info!("  REDIS_URL: {}", config.redis_url);
    info!("  REDIS_QUEUE: {}", config.queue);
    info!("  DEBUG: {}", config.debug);

    if let Some(metrics_port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], metrics_port))
            .install()
            .context("failed to start Prometheus exporter")?;
        info!("Prometheus metrics server started on port {}", metrics_port);
    }

    // No bus, no service
    let bus = RedisBus::connect(&config.redis_url, config.queue.clone())
        .await
        .context("error connecting to Redis")?;
    info!("Connected to Redis, consuming '{}'", bus.queue());

    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Dispatcher::new(registry.clone());

    let (bridge_shutdown_tx, bridge_shutdown_rx) = mpsc::channel(1);
    let mut bridge_handle = tokio::spawn(BusBridge::new(bus, dispatcher).run(bridge_shutdown_rx));

    let app = create_router(Arc::new(AppState::new(registry)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening at {}", addr);

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = server => {
            result.context("server error")?;
            info!("Shutting down bus bridge...");
            let _ = bridge_shutdown_tx.send(()).await;
            let _ = bridge_handle.await;
        }
        result = &mut bridge_handle => {
            let err = match result {
                Ok(Ok(())) => anyhow::anyhow!("bus bridge stopped unexpectedly"),
                Ok(Err(e)) => anyhow::Error::new(e).context("bus bridge failed"),
                Err(e) => anyhow::Error::new(e).context("bus bridge panicked"),
            };
            error!("{:#}", err);
            return Err(err);
        }
    }

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
