use crate::models::{model_supports_files, Attachment, Message, SUPPORTED_MODELS};
use crate::store::StateStore;

pub const PROMPT_COUNT_KEY: &str = "promptCount";
pub const AD_INTERVAL: u64 = 10;

pub const INITIAL_GREETING: &str =
  "Hey! Ask me anything. You'll see a short ad every 10 prompts so everyone can use this for free.";
pub const CLEARED_GREETING: &str = "Cleared! What should we talk about next?";
pub const ERROR_MARKER: &str = "⚠️ ";
pub const AD_PLACEHOLDER: &str = "Ad placeholder (configure AdSense env vars for live ads)";

/// Decides when the interstitial is due, from a prompt counter that lives in
/// the client's persistent store and survives reloads.
pub struct AdGate<S: StateStore> {
  store: S,
  due: bool,
}

impl<S: StateStore> AdGate<S> {
  /// Landing on a nonzero multiple of the interval re-flags the
  /// interstitial, so reloading mid-sequence does not skip an ad.
  pub fn new(store: S) -> Self {
    let count = read_count(&store);
    Self {
      due: count != 0 && count % AD_INTERVAL == 0,
      store,
    }
  }

  /// Counts one submitted prompt. The new value is persisted before the
  /// caller's network request resolves; a crash mid-request keeps the count.
  pub fn record_prompt(&mut self) -> u64 {
    let count = read_count(&self.store) + 1;
    self.store.set(PROMPT_COUNT_KEY, &count.to_string());
    if count % AD_INTERVAL == 0 {
      self.due = true;
    }
    count
  }

  pub fn count(&self) -> u64 {
    read_count(&self.store)
  }

  pub fn is_due(&self) -> bool {
    self.due
  }

  /// Dismissal clears the flag, never the counter.
  pub fn dismiss(&mut self) {
    self.due = false;
  }
}

fn read_count(store: &impl StateStore) -> u64 {
  store
    .get(PROMPT_COUNT_KEY)
    .and_then(|value| value.parse().ok())
    .unwrap_or(0)
}

/// The session's ordered message list. Append-only between clears; errors
/// stay in the thread as marked assistant messages.
pub struct Conversation {
  messages: Vec<Message>,
}

impl Conversation {
  pub fn new() -> Self {
    Self {
      messages: vec![Message::assistant(INITIAL_GREETING)],
    }
  }

  pub fn push_user(&mut self, content: impl Into<String>) {
    self.messages.push(Message::user(content));
  }

  pub fn push_assistant(&mut self, content: impl Into<String>) {
    self.messages.push(Message::assistant(content));
  }

  pub fn push_error(&mut self, message: &str) {
    self.messages.push(Message::assistant(format!("{ERROR_MARKER}{message}")));
  }

  pub fn clear(&mut self) {
    self.messages = vec![Message::assistant(CLEARED_GREETING)];
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn last(&self) -> Option<&Message> {
    self.messages.last()
  }
}

impl Default for Conversation {
  fn default() -> Self {
    Self::new()
  }
}

/// Everything a playground front end keeps per browser tab: the thread, the
/// ad gate, the selected model, and any files staged for the next send.
pub struct PlaygroundSession<S: StateStore> {
  conversation: Conversation,
  ad_gate: AdGate<S>,
  model: String,
  attachments: Vec<Attachment>,
}

impl<S: StateStore> PlaygroundSession<S> {
  pub fn new(store: S) -> Self {
    Self {
      conversation: Conversation::new(),
      ad_gate: AdGate::new(store),
      model: crate::models::DEFAULT_MODEL.to_string(),
      attachments: Vec::new(),
    }
  }

  /// Appends the prompt and counts it toward the ad cadence. Runs before
  /// the network call; the interstitial never blocks the send itself.
  pub fn begin_prompt(&mut self, text: &str) {
    self.conversation.push_user(text);
    self.ad_gate.record_prompt();
  }

  pub fn complete_prompt(&mut self, reply: &str) {
    self.conversation.push_assistant(reply);
  }

  pub fn fail_prompt(&mut self, error: &str) {
    self.conversation.push_error(error);
  }

  pub fn clear_chat(&mut self) {
    self.conversation.clear();
  }

  pub fn messages(&self) -> &[Message] {
    self.conversation.messages()
  }

  pub fn last_message(&self) -> Option<&Message> {
    self.conversation.last()
  }

  pub fn ad_due(&self) -> bool {
    self.ad_gate.is_due()
  }

  pub fn dismiss_ad(&mut self) {
    self.ad_gate.dismiss();
  }

  pub fn prompt_count(&self) -> u64 {
    self.ad_gate.count()
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// Switching models drops any staged files.
  pub fn select_model(&mut self, id: &str) -> bool {
    if !SUPPORTED_MODELS.iter().any(|m| m.id == id) {
      return false;
    }
    self.model = id.to_string();
    self.attachments.clear();
    true
  }

  /// Files are staged only for models that take them.
  pub fn attach(&mut self, attachment: Attachment) -> bool {
    if !model_supports_files(&self.model) {
      return false;
    }
    self.attachments.push(attachment);
    true
  }

  pub fn detach_all(&mut self) {
    self.attachments.clear();
  }

  pub fn attachments(&self) -> &[Attachment] {
    &self.attachments
  }
}

/// Where the interstitial's content comes from: live slot identifiers when
/// both are configured, a visible placeholder otherwise.
pub struct AdSlotConfig {
  pub client: Option<String>,
  pub slot: Option<String>,
}

impl AdSlotConfig {
  pub fn from_env() -> Self {
    Self {
      client: non_empty_var("ADSENSE_CLIENT"),
      slot: non_empty_var("ADSENSE_SLOT"),
    }
  }

  pub fn render(&self) -> String {
    match (&self.client, &self.slot) {
      (Some(client), Some(slot)) => format!("[ad] client {client}, slot {slot}"),
      _ => AD_PLACEHOLDER.to_string(),
    }
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::Role;
  use crate::store::{FileStore, MemoryStore};

  fn store_with_count(count: u64) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.set(PROMPT_COUNT_KEY, &count.to_string());
    store
  }

  #[test]
  fn fresh_counter_does_not_flag_the_ad() {
    let gate = AdGate::new(MemoryStore::new());
    assert_eq!(gate.count(), 0);
    assert!(!gate.is_due());
  }

  #[test]
  fn ninth_prompt_plus_one_flags_the_ad() {
    let mut gate = AdGate::new(store_with_count(9));
    assert!(!gate.is_due());
    assert_eq!(gate.record_prompt(), 10);
    assert!(gate.is_due());
  }

  #[test]
  fn loading_on_a_multiple_of_ten_flags_without_a_send() {
    let gate = AdGate::new(store_with_count(10));
    assert!(gate.is_due());
    let gate = AdGate::new(store_with_count(30));
    assert!(gate.is_due());
    let gate = AdGate::new(store_with_count(11));
    assert!(!gate.is_due());
  }

  #[test]
  fn dismissal_clears_the_flag_but_not_the_counter() {
    let mut gate = AdGate::new(store_with_count(10));
    gate.dismiss();
    assert!(!gate.is_due());
    assert_eq!(gate.count(), 10);
  }

  #[test]
  fn unparseable_counter_restarts_from_zero() {
    let mut store = MemoryStore::new();
    store.set(PROMPT_COUNT_KEY, "not-a-number");
    let mut gate = AdGate::new(store);
    assert_eq!(gate.count(), 0);
    assert_eq!(gate.record_prompt(), 1);
  }

  #[test]
  fn count_is_persisted_before_anything_else_happens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut gate = AdGate::new(FileStore::open(&path).unwrap());
    gate.record_prompt();

    // A second reader sees the write while the first gate is still live.
    let other = FileStore::open(&path).unwrap();
    assert_eq!(other.get(PROMPT_COUNT_KEY).as_deref(), Some("1"));
  }

  #[test]
  fn conversation_starts_with_the_greeting() {
    let conversation = Conversation::new();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].role, Role::Assistant);
    assert_eq!(conversation.messages()[0].content, INITIAL_GREETING);
  }

  #[test]
  fn clear_resets_to_the_cleared_greeting() {
    let mut conversation = Conversation::new();
    conversation.push_user("hi");
    conversation.push_assistant("hello");
    conversation.clear();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].content, CLEARED_GREETING);
  }

  #[test]
  fn errors_become_marked_assistant_messages() {
    let mut conversation = Conversation::new();
    conversation.push_user("hi");
    conversation.push_error("Rate limit exceeded. Please try later.");
    let last = conversation.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "⚠️ Rate limit exceeded. Please try later.");
  }

  #[test]
  fn session_send_flow_appends_in_order() {
    let mut session = PlaygroundSession::new(MemoryStore::new());
    session.begin_prompt("What is Rust?");
    session.complete_prompt("A systems language.");
    session.begin_prompt("And tokio?");
    session.fail_prompt("Request failed");

    let contents: Vec<&str> = session.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
      contents,
      [
        INITIAL_GREETING,
        "What is Rust?",
        "A systems language.",
        "And tokio?",
        "⚠️ Request failed"
      ]
    );
    assert_eq!(session.prompt_count(), 2);
  }

  #[test]
  fn session_flags_ad_on_the_tenth_prompt() {
    let mut session = PlaygroundSession::new(store_with_count(9));
    assert!(!session.ad_due());
    session.begin_prompt("tenth");
    assert!(session.ad_due());
    session.dismiss_ad();
    assert!(!session.ad_due());
    assert_eq!(session.prompt_count(), 10);
  }

  #[test]
  fn switching_models_clears_staged_files() {
    let mut session = PlaygroundSession::new(MemoryStore::new());
    assert!(session.attach(Attachment {
      filename: "notes.pdf".to_string(),
      media_type: "application/pdf".to_string(),
      bytes: vec![1, 2, 3],
    }));
    assert_eq!(session.attachments().len(), 1);

    assert!(session.select_model("gpt-4o"));
    assert!(session.attachments().is_empty());
  }

  #[test]
  fn files_are_refused_for_models_without_support() {
    let mut session = PlaygroundSession::new(MemoryStore::new());
    assert!(session.select_model("gpt-3.5-turbo"));
    assert!(!session.attach(Attachment {
      filename: "notes.pdf".to_string(),
      media_type: "application/pdf".to_string(),
      bytes: vec![1],
    }));
    assert!(session.attachments().is_empty());
  }

  #[test]
  fn unknown_model_is_rejected_and_nothing_changes() {
    let mut session = PlaygroundSession::new(MemoryStore::new());
    assert!(!session.select_model("gpt-99"));
    assert_eq!(session.model(), crate::models::DEFAULT_MODEL);
  }

  #[test]
  fn ad_slot_renders_placeholder_until_fully_configured() {
    let slot = AdSlotConfig { client: None, slot: None };
    assert_eq!(slot.render(), AD_PLACEHOLDER);

    let slot = AdSlotConfig {
      client: Some("ca-pub-1".to_string()),
      slot: None,
    };
    assert_eq!(slot.render(), AD_PLACEHOLDER);

    let slot = AdSlotConfig {
      client: Some("ca-pub-1".to_string()),
      slot: Some("42".to_string()),
    };
    assert_eq!(slot.render(), "[ad] client ca-pub-1, slot 42");
  }
}
