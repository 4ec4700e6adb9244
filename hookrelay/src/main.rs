//! HookRelay delivery service.
//!
//! Serves the management API and event ingestion, runs the delivery workers
//! and the retry sweeper, and drains in-flight deliveries on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::{api_router, AppState, Config, WebhookService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("delivery_service_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        service_name = %config.service_name,
        worker_concurrency = config.worker_concurrency,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        retention_hours = config.delivery_retention.as_secs() / 3600,
        "config_loaded"
    );

    let service = Arc::new(
        WebhookService::new(&config).context("Failed to create delivery service")?,
    );

    let sweeper = tokio::spawn(service.sweeper().run(service.shutdown_token()));

    let app = api_router(AppState::new(Arc::clone(&service)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "delivery_service_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let drained = service.shutdown(config.shutdown_grace).await;
    if !drained {
        warn!(in_flight = service.in_flight(), "delivery_service_shutdown_incomplete");
    }

    if let Err(e) = sweeper.await {
        warn!(error = %e, "retry_sweeper_join_failed");
    }

    info!("delivery_service_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("delivery_service_shutting_down");
}
