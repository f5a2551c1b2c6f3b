//! Key-value stores backing the pending action slot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::browser::KeyValueStore;

/// In-memory store. Lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Every write rewrites the whole file; the lock serializes writers inside
/// this process.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/clarify/storage.json`
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("clarify").join("storage.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("{} does not hold a JSON object", self.path.display()),
        }
    }

    fn write_all(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value);
        self.write_all(map)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("missing").await.unwrap(), None);
        store.set("pendingRequest", json!({"type": "page"})).await.unwrap();
        store.set("other", json!(3)).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("pendingRequest").await.unwrap(),
            Some(json!({"type": "page"}))
        );
        reopened.remove("pendingRequest").await.unwrap();
        assert_eq!(store.get("pendingRequest").await.unwrap(), None);
        assert_eq!(store.get("other").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(JsonFileStore::new(&path).get("k").await.is_err());
    }
}
