//! sinkmeter exporter
//!
//! - Reads session events as NDJSON from stdin
//! - Translates them into metrics via `MetricsBridge`
//! - Serves `/metrics`, `/healthz`, `/readyz`
//!
//! Usage: `sinkmeter-exporter [config.yaml]` (default `sinkmeter.yaml`).

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use sinkmeter_core::error::Result;
use sinkmeter_exporter::bridge::driver;
use sinkmeter_exporter::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "sinkmeter-exporter failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "sinkmeter.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.exporter.listen_addr()?;
    let capacity = cfg.exporter.channel_capacity;

    let state = app_state::AppState::new(cfg)?;
    let bridge = state.bridge();
    bridge.handle_manifest(&state.cfg().manifest.descriptor());

    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(driver::run(bridge.clone(), rx));
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        match driver::feed_lines(stdin, tx, &bridge).await {
            Ok(n) => tracing::info!(events = n, "stdin feed finished"),
            Err(e) => tracing::error!(error = %e, "stdin feed failed"),
        }
    });

    let app = router::build_router(state);

    tracing::info!(%listen, "sinkmeter-exporter starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
