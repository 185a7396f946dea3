use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
  pub role: Role,
  pub content: String,
}

impl Message {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: Role::Assistant, content: content.into() }
  }
}

/// One uploaded file, carried through the proxy without ever being opened.
#[derive(Clone, Debug)]
pub struct Attachment {
  pub filename: String,
  pub media_type: String,
  pub bytes: Vec<u8>,
}

/// What a chat submission boils down to once the body (JSON or multipart)
/// has been read.
#[derive(Default)]
pub struct ChatPayload {
  pub messages: Vec<Message>,
  pub model: Option<String>,
  pub attachments: Vec<Attachment>,
}

impl ChatPayload {
  /// Lenient extraction: a missing or mis-typed `messages` field means an
  /// empty context, and entries that are not `{role: user|assistant,
  /// content: text}` are skipped rather than failing the request.
  pub fn from_value(value: &serde_json::Value) -> Self {
    let messages = value
      .get("messages")
      .and_then(|m| m.as_array())
      .map(|items| parse_items(items))
      .unwrap_or_default();

    let model = value
      .get("model")
      .and_then(|m| m.as_str())
      .map(|m| m.to_string());

    Self { messages, model, attachments: Vec::new() }
  }
}

/// Parse the serialized message array a multipart submission carries in its
/// `messages` field. Anything that is not a JSON array of parseable entries
/// degrades to an empty context, same as the JSON body path.
pub fn parse_message_list(text: &str) -> Vec<Message> {
  serde_json::from_str::<serde_json::Value>(text)
    .ok()
    .and_then(|value| value.as_array().map(|items| parse_items(items)))
    .unwrap_or_default()
}

fn parse_items(items: &[serde_json::Value]) -> Vec<Message> {
  items
    .iter()
    .filter_map(|item| serde_json::from_value::<Message>(item.clone()).ok())
    .collect()
}

#[derive(Serialize, Deserialize)]
pub struct ChatReply {
  pub reply: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct ModelInfo {
  pub id: &'static str,
  pub label: &'static str,
  pub file_support: bool,
}

pub const SUPPORTED_MODELS: &[ModelInfo] = &[
  ModelInfo { id: "gpt-3.5-turbo", label: "GPT-3.5 Turbo", file_support: false },
  ModelInfo { id: "gpt-4o", label: "GPT-4o", file_support: true },
  ModelInfo { id: "gpt-4o-mini", label: "GPT-4o Mini", file_support: true },
];

pub fn model_supports_files(id: &str) -> bool {
  SUPPORTED_MODELS
    .iter()
    .any(|m| m.id == id && m.file_support)
}
