mod file;
mod memory;

use std::sync::Arc;

use serde_json::Value;

use crate::ledger::Ledger;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Key under which the ledger is persisted.
pub const HISTORY_KEY: &str = "retouch.history";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value storage the history is persisted into.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Loads, saves and clears the turn ledger.
///
/// Every operation fails soft: read problems yield an empty ledger, write
/// problems are logged and skipped.
pub struct HistoryStore {
    storage: Box<dyn KeyValueStorage>,
    key: String,
}

impl HistoryStore {
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self::with_key(storage, HISTORY_KEY)
    }

    pub fn with_key(storage: impl KeyValueStorage + 'static, key: impl Into<String>) -> Self {
        Self {
            storage: Box::new(storage),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    pub fn load(&self) -> Ledger {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ledger::new(),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to read history");
                return Ledger::new();
            }
        };
        match serde_json::from_value::<Ledger>(raw) {
            Ok(ledger) => ledger,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "stored history is malformed; ignoring");
                Ledger::new()
            }
        }
    }

    /// Returns whether the ledger was written.
    pub fn save(&self, ledger: &Ledger) -> bool {
        let payload = match serde_json::to_value(ledger) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to encode history");
                return false;
            }
        };
        match self.storage.set(&self.key, payload) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to save history");
                false
            }
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %err, "failed to clear history");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{HistoryStore, MemoryStorage, HISTORY_KEY};
    use crate::ledger::{Ledger, SessionMode, Turn};

    fn sample_ledger() -> Ledger {
        Ledger::from_turns(vec![
            Turn {
                id: 1,
                original_url: "x.png".to_string(),
                source_url: Some("x.png".to_string()),
                prompt: "make it blue".to_string(),
                edited_url: "y.png".to_string(),
                reference_image_urls: vec!["r1.png".to_string(), "r2.png".to_string()],
                mode: Some(SessionMode::Editor),
            },
            Turn {
                id: 2,
                original_url: "x.png".to_string(),
                source_url: Some("y.png".to_string()),
                prompt: "add a hat".to_string(),
                edited_url: "z.png".to_string(),
                reference_image_urls: Vec::new(),
                mode: None,
            },
        ])
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = HistoryStore::new(MemoryStorage::new());
        let ledger = sample_ledger();
        assert!(store.save(&ledger));
        assert_eq!(store.load(), ledger);
    }

    #[test]
    fn missing_entry_loads_empty() {
        let store = HistoryStore::new(MemoryStorage::new());
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_entry_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(HISTORY_KEY, json!("{not json"));
        let store = HistoryStore::new(storage.clone());
        assert!(store.load().is_empty());

        storage.insert(HISTORY_KEY, json!([{"id": "one"}]));
        assert!(store.load().is_empty());
    }

    #[test]
    fn read_failure_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        let store = HistoryStore::new(storage.clone());
        assert!(store.save(&sample_ledger()));
        storage.fail_reads(true);
        assert!(store.load().is_empty());
    }

    #[test]
    fn write_failure_is_skipped() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let store = HistoryStore::new(storage.clone());
        assert!(!store.save(&sample_ledger()));
        assert_eq!(storage.snapshot(HISTORY_KEY), None);
    }

    #[test]
    fn clear_removes_entry() {
        let storage = Arc::new(MemoryStorage::new());
        let store = HistoryStore::new(storage.clone());
        assert!(store.save(&sample_ledger()));
        store.clear();
        assert_eq!(storage.snapshot(HISTORY_KEY), None);
        assert!(store.load().is_empty());
    }
}
