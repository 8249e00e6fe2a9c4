use anyhow::{Context, Result};
use qrcode_service::{
    start_api_server, AppState, Config, FsArtifactStore, LifecycleManager, PngQrEncoder,
    QrGenerator,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        root = %config.storage.root.display(),
        retention_days = config.storage.retention_days,
        "Starting QR code service"
    );

    // Initialize metrics
    if config.service.metrics_port != 0 {
        init_metrics(config.service.metrics_port)?;
    }

    // Initialize components
    let store = Arc::new(
        FsArtifactStore::open(&config.storage.root)
            .await
            .context("Failed to initialize artifact store")?,
    );

    let lifecycle = Arc::new(LifecycleManager::new(store.clone()));

    let generator = Arc::new(QrGenerator::new(
        store,
        Arc::new(PngQrEncoder::default()),
        lifecycle.clone(),
        config.retention(),
        config.cleanup.on_generate_cutoff_days,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn retention sweeper
    let sweeper_handle = config.sweep_interval().map(|interval| {
        tokio::spawn(lifecycle.clone().run_sweeper(
            interval,
            config.cleanup.sweep_cutoff_days,
            shutdown_rx.clone(),
        ))
    });

    // Spawn API server task
    let api_state = AppState { generator };
    let api_config = config.api.clone();
    let server_shutdown = wait_for_shutdown(shutdown_rx.clone());
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, server_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("QR code service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down QR code service");

    broadcast_shutdown(&shutdown_tx);

    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Sweeper task failed");
        }
    }

    info!("QR code service stopped");

    Ok(())
}

/// JSON logs; `RUST_LOG` wins over `service.log_level`
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(false))
        .init();
}

/// Expose the `qr.*` counters on `/metrics` at `port`
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to start QR code metrics exporter on port {port}"))?;

    info!(port, "QR code metrics exporter listening");

    Ok(())
}

/// Resolves once shutdown is broadcast or the sender goes away
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.changed().await.is_err() {
        debug!("Shutdown sender dropped before signalling");
    }
}

/// Tell every spawned task to stop; returns whether anyone was listening
fn broadcast_shutdown(tx: &watch::Sender<bool>) -> bool {
    if tx.send(true).is_err() {
        debug!("No tasks left listening for shutdown");
        return false;
    }
    true
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
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
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
