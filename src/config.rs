use std::time::Duration;

use crate::models::DEFAULT_MODEL;
use crate::ratelimit::RateLimitPolicy;

/// Name of the environment variable holding the upstream credential. Its
/// absence is a per-request failure, never a startup failure.
pub const CREDENTIAL_VAR: &str = "OPENAI_API_KEY";

pub const DEFAULT_ADDR: &str = "127.0.0.1:8170";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppConfig {
  pub addr: String,
  pub upstream: UpstreamConfig,
  pub rate: RateLimitPolicy,
}

#[derive(Clone)]
pub struct UpstreamConfig {
  pub api_key: Option<String>,
  pub url: String,
  pub model: String,
  pub timeout: Duration,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      addr: DEFAULT_ADDR.to_string(),
      upstream: UpstreamConfig::default(),
      rate: RateLimitPolicy::default(),
    }
  }
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      url: DEFAULT_UPSTREAM_URL.to_string(),
      model: DEFAULT_MODEL.to_string(),
      timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
    }
  }
}

impl AppConfig {
  /// Build the server configuration from the environment.
  ///
  /// Recognized variables:
  /// - `OPENAI_API_KEY`: upstream credential (requests fail without it)
  /// - `OPENAI_MODEL`: upstream model id (default: "gpt-4o-mini")
  /// - `CHATKIOSK_ADDR`: bind address (default: "127.0.0.1:8170")
  /// - `CHATKIOSK_UPSTREAM_URL`: completions endpoint (default: OpenAI)
  /// - `CHATKIOSK_UPSTREAM_TIMEOUT_SECS`: upstream timeout (default: 30)
  /// - `CHATKIOSK_RATE_WINDOW_SECS`: rate window (default: 3600)
  /// - `CHATKIOSK_RATE_MAX_REQUESTS`: requests per key per window (default: 100)
  pub fn from_env() -> Self {
    let defaults = AppConfig::default();

    let api_key = std::env::var(CREDENTIAL_VAR)
      .ok()
      .filter(|k| !k.trim().is_empty());
    let model = std::env::var("OPENAI_MODEL").unwrap_or(defaults.upstream.model);
    let addr = std::env::var("CHATKIOSK_ADDR").unwrap_or(defaults.addr);
    let url = std::env::var("CHATKIOSK_UPSTREAM_URL").unwrap_or(defaults.upstream.url);
    let timeout_secs = std::env::var("CHATKIOSK_UPSTREAM_TIMEOUT_SECS")
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    let window_secs = std::env::var("CHATKIOSK_RATE_WINDOW_SECS")
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or_else(|| defaults.rate.window.as_secs());
    let max_requests = std::env::var("CHATKIOSK_RATE_MAX_REQUESTS")
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or(defaults.rate.max_requests);

    Self {
      addr,
      upstream: UpstreamConfig {
        api_key,
        url,
        model,
        timeout: Duration::from_secs(timeout_secs),
      },
      rate: RateLimitPolicy {
        max_requests,
        window: Duration::from_secs(window_secs),
      },
    }
  }
}
