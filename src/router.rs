use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::models::{parse_message_list, Attachment, ChatPayload, ChatReply};
use crate::ratelimit::{FixedWindowLimiter, RateLimiter};
use crate::upstream::CompletionsClient;

/// Bucket shared by every client that presents no forwarded address.
pub const UNKNOWN_CLIENT: &str = "unknown";

const JSON_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub struct RouterState {
  pub started_at: Instant,
  pub limiter: Arc<dyn RateLimiter>,
  pub upstream: CompletionsClient,
}

impl RouterState {
  pub fn new(config: AppConfig) -> Self {
    Self {
      started_at: Instant::now(),
      limiter: Arc::new(FixedWindowLimiter::new(config.rate)),
      upstream: CompletionsClient::new(config.upstream),
    }
  }
}

pub async fn run_router(listener: TcpListener, state: RouterState) -> anyhow::Result<()> {
  let app = Router::new()
    .route("/health", get(health))
    .route("/api/chat", post(chat))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(Arc::new(state));

  listener.set_nonblocking(true)?;
  let listener = tokio::net::TcpListener::from_std(listener)?;
  axum::serve(listener, app).await?;
  Ok(())
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis() as u64;
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime
  }))
}

/// Check order is fixed: rate limit, then body, then credential and
/// upstream inside the client. A denied request never reads its body.
async fn chat(State(state): State<Arc<RouterState>>, request: Request) -> Response {
  let key = client_key(request.headers());
  if !state.limiter.allow(&key) {
    warn!(client = %key, "rate limit exceeded");
    return ChatError::RateLimited.into_response();
  }

  let request_id = uuid::Uuid::new_v4();
  let started = Instant::now();

  let payload = match read_payload(request).await {
    Ok(payload) => payload,
    Err(err) => {
      warn!(%request_id, client = %key, error = %err, "unreadable chat body");
      return err.into_response();
    }
  };

  match state
    .upstream
    .complete(&payload.messages, &payload.attachments)
    .await
  {
    Ok(reply) => {
      info!(
        %request_id,
        client = %key,
        model = %state.upstream.model(),
        messages = payload.messages.len(),
        attachments = payload.attachments.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chat round-trip complete"
      );
      (StatusCode::OK, Json(ChatReply { reply })).into_response()
    }
    Err(err) => {
      warn!(%request_id, client = %key, error = %err, "chat request failed");
      err.into_response()
    }
  }
}

/// First comma-separated value of `x-forwarded-for`, trimmed. The header is
/// client-supplied; without a trusted proxy rewriting it, callers can pick
/// their own bucket. Everyone behind one NAT shares a bucket the same way.
fn client_key(headers: &HeaderMap) -> String {
  headers
    .get("x-forwarded-for")
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.split(',').next())
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .unwrap_or(UNKNOWN_CLIENT)
    .to_string()
}

async fn read_payload(request: Request) -> Result<ChatPayload, ChatError> {
  let content_type = request
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .unwrap_or("")
    .to_string();

  if content_type.starts_with("multipart/form-data") {
    let multipart = Multipart::from_request(request, &())
      .await
      .map_err(ChatError::transport)?;
    read_multipart(multipart).await
  } else {
    let bytes = axum::body::to_bytes(request.into_body(), JSON_BODY_LIMIT)
      .await
      .map_err(ChatError::transport)?;
    // A body that is not JSON gets the same fail-open treatment as a
    // missing `messages` field: empty context, not an error.
    Ok(
      serde_json::from_slice::<serde_json::Value>(&bytes)
        .map(|value| ChatPayload::from_value(&value))
        .unwrap_or_default(),
    )
  }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ChatPayload, ChatError> {
  let mut payload = ChatPayload::default();
  while let Some(field) = multipart.next_field().await.map_err(ChatError::transport)? {
    let name = field.name().unwrap_or("").to_string();
    match name.as_str() {
      "messages" => {
        let text = field.text().await.map_err(ChatError::transport)?;
        payload.messages = parse_message_list(&text);
      }
      "model" => {
        payload.model = field.text().await.ok().filter(|m| !m.is_empty());
      }
      "files" => {
        let filename = field.file_name().unwrap_or("attachment").to_string();
        let media_type = field
          .content_type()
          .unwrap_or("application/octet-stream")
          .to_string();
        let bytes = field.bytes().await.map_err(ChatError::transport)?;
        payload.attachments.push(Attachment {
          filename,
          media_type,
          bytes: bytes.to_vec(),
        });
      }
      _ => {}
    }
  }
  Ok(payload)
}
