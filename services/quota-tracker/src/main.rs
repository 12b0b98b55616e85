use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use video_intake_quota_tracker::{
    create_router, ApiState, QuotaTracker, QuotaTrackerConfig, StoreHandle,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = QuotaTrackerConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        host = %config.server_host,
        port = config.server_port,
        backend = %config.backend,
        ceiling = config.upload_ceiling,
        "starting upload quota tracker"
    );

    if config.backend.has_cross_process_race() {
        warn!(
            path = %config.json_path().display(),
            "flat-file backend is only serialized within this process; do not share the file between instances"
        );
    }

    let store = StoreHandle::lazy(config.store_settings());
    let tracker = QuotaTracker::new(store, &config);

    // Connect eagerly so misconfiguration shows up at startup; requests would
    // otherwise initialize the handle on first use.
    match tracker.health().await {
        Ok(backend) => info!(%backend, "upload store ready"),
        Err(err) => warn!(error = %err, "upload store not reachable yet, will retry on first request"),
    }

    let _expiry_task = config
        .record_ttl()
        .map(|_| tracker.start_expiry_task(config.expiry_sweep_interval()));

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .context("invalid server bind address")?;
    let state = Arc::new(ApiState::new(tracker, config));
    let router = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "upload quota tracker listening");

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server encountered an unrecoverable error")?;

    info!("upload quota tracker shutting down");
    Ok(())
}

fn init_tracing(config: &QuotaTrackerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
