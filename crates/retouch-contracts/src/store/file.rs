use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{KeyValueStorage, StorageError};

/// Key-value storage backed by a single pretty-printed JSON object file.
///
/// Each write re-reads the file and only replaces the touched key, so other
/// keys written by another process survive.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(entries) => Ok(entries),
            _ => Err(StorageError::Unavailable(format!(
                "{} does not hold a json object",
                self.path.display()
            ))),
        }
    }

    /// Entries to rewrite on update. Unparseable content is dropped so one bad
    /// file cannot block every later save; io errors are passed up so a
    /// transient failure never clobbers other keys.
    fn read_for_update(&self) -> Result<Map<String, Value>, StorageError> {
        match self.read_all() {
            Err(StorageError::Json(_) | StorageError::Unavailable(_)) => Ok(Map::new()),
            other => other,
        }
    }

    fn write_all(&self, entries: Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&Value::Object(entries))?,
        )?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.read_for_update()?;
        entries.insert(key.to_string(), value);
        self.write_all(entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut entries = self.read_for_update()?;
        entries.remove(key);
        self.write_all(entries)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::FileStorage;
    use crate::ledger::{Ledger, Turn};
    use crate::store::{HistoryStore, KeyValueStorage, StorageError, HISTORY_KEY};

    #[test]
    fn missing_file_reads_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let storage = FileStorage::new(temp.path().join("nested").join("storage.json"));
        assert_eq!(storage.get("anything")?, None);
        Ok(())
    }

    #[test]
    fn set_creates_parent_and_keeps_other_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("storage.json");
        let storage_a = FileStorage::new(&path);
        let storage_b = FileStorage::new(&path);

        storage_a.set("a", json!(1))?;
        storage_b.set("b", json!([2]))?;

        let reloaded = FileStorage::new(&path);
        assert_eq!(reloaded.get("a")?, Some(json!(1)));
        assert_eq!(reloaded.get("b")?, Some(json!([2])));

        reloaded.remove("a")?;
        assert_eq!(storage_a.get("a")?, None);
        assert_eq!(storage_a.get("b")?, Some(json!([2])));
        Ok(())
    }

    #[test]
    fn corrupt_file_fails_read_but_is_replaced_on_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        std::fs::write(&path, "{{{ definitely not json")?;
        let storage = FileStorage::new(&path);
        assert!(storage.get(HISTORY_KEY).is_err());

        storage.set(HISTORY_KEY, json!([]))?;
        assert_eq!(storage.get(HISTORY_KEY)?, Some(json!([])));
        Ok(())
    }

    #[test]
    fn unreadable_file_is_not_overwritten() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // A directory in place of the file reads as an io error, not as corruption.
        let path = temp.path().join("storage.json");
        std::fs::create_dir(&path)?;
        std::fs::write(path.join("keep.txt"), "other data")?;
        let storage = FileStorage::new(&path);

        assert!(matches!(
            storage.set(HISTORY_KEY, json!([])),
            Err(StorageError::Io(_))
        ));
        assert!(matches!(storage.remove(HISTORY_KEY), Err(StorageError::Io(_))));
        assert!(path.is_dir());
        assert_eq!(std::fs::read_to_string(path.join("keep.txt"))?, "other data");
        Ok(())
    }

    #[test]
    fn history_store_over_corrupt_file_restores_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        std::fs::write(&path, "[1, 2")?;
        let store = HistoryStore::new(FileStorage::new(&path));
        assert!(store.load().is_empty());
        Ok(())
    }

    #[test]
    fn history_store_roundtrips_through_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let ledger = Ledger::from_turns(vec![Turn {
            id: 42,
            original_url: "x.png".to_string(),
            source_url: None,
            prompt: "a boat at dusk".to_string(),
            edited_url: "x.png".to_string(),
            reference_image_urls: vec!["ref.webp".to_string()],
            mode: None,
        }]);
        let store = HistoryStore::new(FileStorage::new(&path));
        assert!(store.save(&ledger));

        let reopened = HistoryStore::new(FileStorage::new(&path));
        assert_eq!(reopened.load(), ledger);

        reopened.clear();
        assert!(store.load().is_empty());
        Ok(())
    }
}
