//! Content testing backend
//!
//! - Axum HTTP API over the content-test harness
//! - JSON-file or in-memory descriptor store
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   HARNESS_CONFIG_PATH : path to TOML config (store, response tags, staff, templates, problems)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use content_testing::config::load_config_from_env;
use content_testing::routes::build_router;
use content_testing::state::AppState;
use content_testing::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = load_config_from_env().unwrap_or_else(|| {
    warn!(target: "content_testing_backend", "No usable HARNESS_CONFIG_PATH; using defaults");
    Default::default()
  });
  let state = Arc::new(AppState::from_config(&cfg)?);
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "content_testing_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "content_testing_backend", error = %e, "Failed to listen for ctrl-c");
    return;
  }
  info!(target: "content_testing_backend", "Shutdown requested");
}
