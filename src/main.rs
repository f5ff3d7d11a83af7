use anyhow::Result;
use axum::Router;
use tracing::{info, warn};
use v2g_dispatch_controller::{api, app, config::Config, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;

    if cfg.auth.token.is_empty() || cfg.auth.token.starts_with("__SET_VIA_ENV") {
        anyhow::bail!(
            "V2G__AUTH__TOKEN must be set to a secure random token (min 32 chars). \
            Generate one with: openssl rand -base64 32"
        );
    }
    if cfg.auth.token == "devtoken" {
        warn!("using 'devtoken' auth token - only safe for local development");
    }

    let (state, progress_rx) = app::AppState::new(cfg.clone()).await?;
    app::spawn_background_tasks(&state, progress_rx);

    let router: Router = api::router(state, &cfg);
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - reachable from the network; prefer 127.0.0.1 behind a proxy");
    }

    info!(%addr, "starting V2G dispatch controller");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
