use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The smallest key-value store that can stand in for the browser-local
/// storage a playground front end keeps its prompt counter in.
pub trait StateStore {
  fn get(&self, key: &str) -> Option<String>;
  fn set(&mut self, key: &str, value: &str);
}

/// In-memory stub for tests and server-side environments.
#[derive(Default)]
pub struct MemoryStore {
  values: HashMap<String, String>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StateStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: &str) {
    self.values.insert(key.to_string(), value.to_string());
  }
}

#[derive(Serialize, Deserialize, Default)]
struct StateFile {
  values: HashMap<String, String>,
  updated_at: Option<String>,
}

/// One JSON file per client installation. Every `set` is flushed to disk
/// right away; a write failure is logged and the in-memory value kept.
pub struct FileStore {
  path: PathBuf,
  values: HashMap<String, String>,
}

impl FileStore {
  pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
    let path = path.into();
    let values = if path.exists() {
      let data = std::fs::read_to_string(&path)?;
      let file: StateFile = serde_json::from_str(&data)?;
      file.values
    } else {
      HashMap::new()
    };
    Ok(Self { path, values })
  }

  fn save(&self) -> anyhow::Result<()> {
    let file = StateFile {
      values: self.values.clone(),
      updated_at: Some(Utc::now().to_rfc3339()),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&self.path, json)?;
    Ok(())
  }
}

impl StateStore for FileStore {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: &str) {
    self.values.insert(key.to_string(), value.to_string());
    if let Err(err) = self.save() {
      tracing::warn!(path = %self.path.display(), error = %err, "failed to persist client state");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_store_round_trips() {
    let mut store = MemoryStore::new();
    assert_eq!(store.get("promptCount"), None);
    store.set("promptCount", "7");
    assert_eq!(store.get("promptCount").as_deref(), Some("7"));
    store.set("promptCount", "8");
    assert_eq!(store.get("promptCount").as_deref(), Some("8"));
  }

  #[test]
  fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut store = FileStore::open(&path).unwrap();
    store.set("promptCount", "10");
    drop(store);

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get("promptCount").as_deref(), Some("10"));
  }

  #[test]
  fn every_set_is_flushed_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut store = FileStore::open(&path).unwrap();
    store.set("promptCount", "1");

    // A second handle opened before the first is dropped already sees
    // the write.
    let other = FileStore::open(&path).unwrap();
    assert_eq!(other.get("promptCount").as_deref(), Some("1"));
  }

  #[test]
  fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("nothing-here.json")).unwrap();
    assert_eq!(store.get("promptCount"), None);
  }

  #[test]
  fn corrupt_file_is_an_error_not_a_silent_reset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(FileStore::open(&path).is_err());
  }
}
