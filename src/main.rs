use anyhow::Context;
use tracing::{info, warn};

use chatkiosk::config::{AppConfig, CREDENTIAL_VAR};
use chatkiosk::router::{run_router, RouterState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    )
    .compact()
    .init();

  let config = AppConfig::from_env();
  if config.upstream.api_key.is_none() {
    warn!("{CREDENTIAL_VAR} is not set; every chat request will fail until it is");
  }

  let listener = std::net::TcpListener::bind(&config.addr)
    .with_context(|| format!("binding {}", config.addr))?;
  info!(
    addr = %config.addr,
    model = %config.upstream.model,
    window_secs = config.rate.window.as_secs(),
    max_requests = config.rate.max_requests,
    "chatkiosk listening"
  );

  run_router(listener, RouterState::new(config)).await
}
