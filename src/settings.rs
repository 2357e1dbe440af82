//! Settings persistence (v0.1)
//!
//! Key-value store behind a trait so hosts choose where preferences
//! live: in memory for tests and ephemeral runs, or a JSON file on disk.
//! Values are arbitrary JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::ScoutError;

/// Persistent key-value settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read one key
    async fn get(&self, key: &str) -> Option<Value>;

    /// Write one key
    async fn set(&self, key: &str, value: Value) -> Result<(), ScoutError>;

    /// Snapshot of every key
    async fn get_all(&self) -> HashMap<String, Value>;

    /// Flush to the backing medium (no-op for in-memory stores)
    async fn save(&self) -> Result<(), ScoutError>;

    /// Remove every key
    async fn erase(&self) -> Result<(), ScoutError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Settings that live and die with the process
#[derive(Default)]
pub struct MemorySettings {
    entries: DashMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ScoutError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self) -> HashMap<String, Value> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    async fn save(&self) -> Result<(), ScoutError> {
        Ok(())
    }

    async fn erase(&self) -> Result<(), ScoutError> {
        self.entries.clear();
        Ok(())
    }
}

// ============================================================================
// FILE-BACKED STORE
// ============================================================================

/// Settings persisted as one pretty-printed JSON document.
///
/// Mutations are in-memory until `save()`; `open()` loads the existing
/// document when the file is present.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
}

impl FileSettings {
    /// Open a file-backed store, loading existing content if any
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ScoutError> {
        let path = path.as_ref().to_path_buf();
        let entries = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "settings opened");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ScoutError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self) -> HashMap<String, Value> {
        self.entries.read().clone()
    }

    async fn save(&self) -> Result<(), ScoutError> {
        let json = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    async fn erase(&self) -> Result<(), ScoutError> {
        self.entries.write().clear();
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemorySettings::new();
        store.set("theme", json!("dark")).await.unwrap();
        store.set("pageSize", json!(50)).await.unwrap();

        assert_eq!(store.get("theme").await, Some(json!("dark")));
        assert_eq!(store.get("missing").await, None);
        assert_eq!(store.get_all().await.len(), 2);

        store.erase().await.unwrap();
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn file_store_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileSettings::open(&path).await.unwrap();
            store.set("theme", json!("dark")).await.unwrap();
            store.save().await.unwrap();
        }

        let reopened = FileSettings::open(&path).await.unwrap();
        assert_eq!(reopened.get("theme").await, Some(json!("dark")));
    }

    #[tokio::test]
    async fn file_store_mutations_are_in_memory_until_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettings::open(&path).await.unwrap();
        store.set("theme", json!("dark")).await.unwrap();

        // Not saved yet: a fresh open sees nothing.
        let fresh = FileSettings::open(&path).await.unwrap();
        assert_eq!(fresh.get("theme").await, None);
    }

    #[tokio::test]
    async fn file_store_erase_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettings::open(&path).await.unwrap();
        store.set("k", json!(1)).await.unwrap();
        store.save().await.unwrap();
        assert!(path.exists());

        store.erase().await.unwrap();
        assert!(!path.exists());
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = FileSettings::open(&path).await.unwrap_err();
        assert!(matches!(err, ScoutError::JsonParse(_)));
    }
}
