//! Process observability: tracing subscriber setup and shutdown signal.
//!
//! Vehicle telemetry (SoC, capacity) lives in `domain::vehicle`, not here.

use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,tower_http=info,axum=warn,hyper=warn";

/// JSON logs by default for log shippers; set `V2G_LOG_PRETTY=1` for a
/// human-readable console format during development.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("V2G_LOG_PRETTY").is_ok() {
        registry
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received, shutting down"),
        _ = terminate => info!("terminate signal received, shutting down"),
    }
}
