use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::{UpstreamConfig, CREDENTIAL_VAR};
use crate::error::ChatError;
use crate::models::{Attachment, Message, Role};

/// Prepended to every outbound context; never part of the stored
/// conversation.
pub const SYSTEM_PROMPT: &str =
  "You are a helpful, concise assistant in a public ad-supported playground. Avoid unsafe content.";

/// Substituted when the upstream answers without usable content.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't generate a response.";

const TEMPERATURE: f32 = 0.7;

#[derive(Serialize)]
struct CompletionRequest {
  model: String,
  messages: Vec<OutboundMessage>,
  temperature: f32,
}

#[derive(Serialize)]
struct OutboundMessage {
  role: String,
  content: serde_json::Value,
}

#[derive(Deserialize)]
struct CompletionResponse {
  #[serde(default)]
  choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
  #[serde(default)]
  message: ChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChoiceMessage {
  content: Option<String>,
}

pub struct CompletionsClient {
  client: reqwest::Client,
  config: UpstreamConfig,
}

impl CompletionsClient {
  pub fn new(config: UpstreamConfig) -> Self {
    Self {
      client: reqwest::Client::new(),
      config,
    }
  }

  pub fn model(&self) -> &str {
    &self.config.model
  }

  /// One request/response round-trip to the completions endpoint. The
  /// credential is checked before anything goes on the wire; nothing here
  /// is retried.
  pub async fn complete(
    &self,
    messages: &[Message],
    attachments: &[Attachment],
  ) -> Result<String, ChatError> {
    let api_key = self
      .config
      .api_key
      .as_deref()
      .ok_or(ChatError::MissingCredential(CREDENTIAL_VAR))?;

    let payload = build_payload(&self.config.model, messages, attachments);
    let response = self
      .client
      .post(&self.config.url)
      .bearer_auth(api_key)
      .timeout(self.config.timeout)
      .json(&payload)
      .send()
      .await
      .map_err(|err| self.classify(err))?;

    if !response.status().is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ChatError::Upstream(body));
    }

    let completion: CompletionResponse =
      response.json().await.map_err(|err| self.classify(err))?;
    Ok(extract_reply(completion))
  }

  fn classify(&self, err: reqwest::Error) -> ChatError {
    if err.is_timeout() {
      ChatError::Timeout(self.config.timeout.as_secs())
    } else {
      ChatError::transport(err)
    }
  }
}

/// Outbound context: exactly one system message, then the client messages
/// in their given order. Files ride on the final user message as opaque
/// data-URL parts; one is appended when the context has no user message.
fn build_payload(
  model: &str,
  messages: &[Message],
  attachments: &[Attachment],
) -> CompletionRequest {
  let mut outbound = Vec::with_capacity(messages.len() + 1);
  outbound.push(OutboundMessage {
    role: "system".to_string(),
    content: serde_json::json!(SYSTEM_PROMPT),
  });

  let last_user = messages.iter().rposition(|m| m.role == Role::User);
  for (idx, message) in messages.iter().enumerate() {
    let content = if Some(idx) == last_user && !attachments.is_empty() {
      content_with_files(&message.content, attachments)
    } else {
      serde_json::json!(message.content)
    };
    outbound.push(OutboundMessage {
      role: message.role.as_str().to_string(),
      content,
    });
  }

  if last_user.is_none() && !attachments.is_empty() {
    outbound.push(OutboundMessage {
      role: "user".to_string(),
      content: content_with_files("", attachments),
    });
  }

  CompletionRequest {
    model: model.to_string(),
    messages: outbound,
    temperature: TEMPERATURE,
  }
}

fn content_with_files(text: &str, attachments: &[Attachment]) -> serde_json::Value {
  let mut parts = vec![serde_json::json!({ "type": "text", "text": text })];
  for attachment in attachments {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&attachment.bytes);
    let url = format!("data:{};base64,{}", attachment.media_type, encoded);
    parts.push(serde_json::json!({
      "type": "file",
      "file": { "filename": attachment.filename, "file_data": url }
    }));
  }
  serde_json::Value::Array(parts)
}

fn extract_reply(completion: CompletionResponse) -> String {
  completion
    .choices
    .into_iter()
    .next()
    .and_then(|choice| choice.message.content)
    .filter(|content| !content.is_empty())
    .unwrap_or_else(|| FALLBACK_REPLY.to_string())
}
