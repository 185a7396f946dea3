use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Everything that can terminate a chat request. Each kind maps to a wire
/// status; none of them is ever retried.
#[derive(Debug, Error)]
pub enum ChatError {
  #[error("Rate limit exceeded. Please try later.")]
  RateLimited,

  #[error("Server missing {0}")]
  MissingCredential(&'static str),

  #[error("Upstream error: {0}")]
  Upstream(String),

  #[error("Upstream request timed out after {0}s")]
  Timeout(u64),

  #[error("{0}")]
  Transport(String),
}

impl ChatError {
  /// Transport failures carry whatever message the underlying error had;
  /// an empty one degrades to a generic marker instead of a blank body.
  pub fn transport(err: impl ToString) -> Self {
    let message = err.to_string();
    if message.is_empty() {
      ChatError::Transport("Unknown error".to_string())
    } else {
      ChatError::Transport(message)
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
      ChatError::MissingCredential(_)
      | ChatError::Upstream(_)
      | ChatError::Timeout(_)
      | ChatError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ChatError {
  fn into_response(self) -> Response {
    let body = Json(serde_json::json!({ "error": self.to_string() }));
    (self.status(), body).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rate_limit_maps_to_429_with_fixed_message() {
    let err = ChatError::RateLimited;
    assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.to_string(), "Rate limit exceeded. Please try later.");
  }

  #[test]
  fn missing_credential_names_the_variable() {
    let err = ChatError::MissingCredential("OPENAI_API_KEY");
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Server missing OPENAI_API_KEY");
  }

  #[test]
  fn upstream_failure_embeds_body_verbatim() {
    let err = ChatError::Upstream("{\"error\":\"quota\"}".to_string());
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Upstream error: {\"error\":\"quota\"}");
  }

  #[test]
  fn empty_transport_message_becomes_unknown_error() {
    let err = ChatError::transport("");
    assert_eq!(err.to_string(), "Unknown error");
    let err = ChatError::transport("connection reset");
    assert_eq!(err.to_string(), "connection reset");
  }

  #[test]
  fn timeout_is_its_own_kind_but_stays_500() {
    let err = ChatError::Timeout(30);
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Upstream request timed out after 30s");
  }
}
