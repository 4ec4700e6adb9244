//! HookRelay receiver - verifies and acknowledges signed webhook deliveries.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::{receiver_router, Config, InboundState, SignaturePolicy};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("receiver_starting");

    let config = Config::from_env();
    info!(
        port = config.receiver_port,
        secret_configured = config.inbound_secret.is_some(),
        allow_unsigned = config.inbound_allow_unsigned,
        "config_loaded"
    );
    if config.inbound_secret.is_none() && !config.inbound_allow_unsigned {
        warn!("receiver_secret_not_configured_rejecting_all");
    }

    let state = InboundState::new(
        config.inbound_secret.clone(),
        SignaturePolicy {
            allow_unsigned: config.inbound_allow_unsigned,
        },
    );
    let app = receiver_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.receiver_port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "receiver_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("receiver_shutdown_complete");

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

    info!("receiver_shutting_down");
}
