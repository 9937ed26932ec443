//! Waitlist HTTP server.
//!
//! Code-gated event waitlist: admission with sequential event ids, PDF
//! identity cards and certificates, email delivery.

use anyhow::Context;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waitlist::{bootstrap, config::Config, metrics::register_metrics, server::build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},waitlist=debug,tower_http=info", config.server.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting waitlist server");
    info!(
        backend = ?config.storage.backend,
        late_registration_start = %config.registration.late_registration_start,
        certificate_release = %config.registration.certificate_release,
        "Configuration loaded"
    );

    if config.server.metrics_enabled {
        let addr: SocketAddr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
            .parse()
            .context("Invalid metrics address")?;
        waitlist_runtime::metrics::install_exporter(addr)?;
    }
    register_metrics();

    let state = bootstrap::build_app_state(&config).await?;
    let app = build_router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Server listening");

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
        })
        .into_future();
    tokio::pin!(server);

    // In-flight requests get `grace` to finish once a signal arrives
    tokio::select! {
        result = &mut server => result.context("Server error")?,
        () = async {
            let _ = shutdown_rx.changed().await;
            tokio::time::sleep(grace).await;
        } => warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out"),
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
