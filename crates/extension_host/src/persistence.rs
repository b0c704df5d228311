//! Document storage for groups, command overrides and extension maps.
//!
//! Documents are JSON values addressed by a `/`-separated namespace such as
//! `Groups` or `Extensions/greeter/Configuration`.

use crate::error::StoreError;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const GROUPS_NAMESPACE: &str = "Groups";
pub const COMMANDS_NAMESPACE: &str = "Commands";
pub const EXTENSION_MANAGER_NAMESPACE: &str = "ExtensionManager";

pub fn translations_namespace(extension: &str) -> String {
    format!("Extensions/{extension}/Translations")
}

pub fn configuration_namespace(extension: &str) -> String {
    format!("Extensions/{extension}/Configuration")
}

/// Where persisted documents live.
pub trait DocumentStore: Send + Sync {
    /// Loads a document. A missing document comes back as an empty object
    /// with `true` as the second element so the caller can write defaults.
    fn load(&self, namespace: &str) -> Result<(Value, bool), StoreError>;

    fn save(&self, namespace: &str, document: &Value) -> Result<(), StoreError>;
}

fn segments(namespace: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = namespace.split('/').collect();
    let valid = parts.iter().all(|part| {
        !part.is_empty()
            && *part != "."
            && *part != ".."
            && !part.contains(['\\', ':'])
    });
    if valid {
        Ok(parts)
    } else {
        Err(StoreError::InvalidNamespace(namespace.to_string()))
    }
}

/// Pretty-printed JSON files under a root directory. Namespace segments
/// become directories: `Extensions/greeter/Translations` is stored at
/// `<root>/Extensions/greeter/Translations.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        let parts = segments(namespace)?;
        let mut path = self.root.clone();
        if let Some((file, dirs)) = parts.split_last() {
            path.extend(dirs);
            path.push(format!("{file}.json"));
        }
        Ok(path)
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, namespace: &str) -> Result<(Value, bool), StoreError> {
        let path = self.path_for(namespace)?;
        if !path.exists() {
            debug!("No document at {}, starting empty", path.display());
            return Ok((Value::Object(Map::new()), true));
        }

        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let document = serde_json::from_str(&content).map_err(|source| {
            StoreError::Serialization {
                namespace: namespace.to_string(),
                source,
            }
        })?;
        Ok((document, false))
    }

    fn save(&self, namespace: &str, document: &Value) -> Result<(), StoreError> {
        let path = self.path_for(namespace)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(document).map_err(|source| {
            StoreError::Serialization {
                namespace: namespace.to_string(),
                source,
            }
        })?;
        fs::write(&path, content).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Saved {}", path.display());
        Ok(())
    }
}

/// In-process store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document as if it had been saved earlier.
    pub fn with(self, namespace: impl Into<String>, document: Value) -> Self {
        self.documents.insert(namespace.into(), document);
        self
    }

    pub fn get(&self, namespace: &str) -> Option<Value> {
        self.documents.get(namespace).map(|entry| entry.value().clone())
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, namespace: &str) -> Result<(Value, bool), StoreError> {
        segments(namespace)?;
        Ok(match self.documents.get(namespace) {
            Some(document) => (document.value().clone(), false),
            None => (Value::Object(Map::new()), true),
        })
    }

    fn save(&self, namespace: &str, document: &Value) -> Result<(), StoreError> {
        segments(namespace)?;
        self.documents.insert(namespace.to_string(), document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let namespace = configuration_namespace("greeter");

        let (empty, created) = store.load(&namespace).unwrap();
        assert!(created);
        assert_eq!(empty, json!({}));

        store.save(&namespace, &json!({ "MaxGreetings": 3 })).unwrap();
        assert!(dir
            .path()
            .join("Extensions/greeter/Configuration.json")
            .exists());

        let (loaded, created) = store.load(&namespace).unwrap();
        assert!(!created);
        assert_eq!(loaded["MaxGreetings"], 3);
    }

    #[test]
    fn test_json_store_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Groups.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(matches!(
            store.load(GROUPS_NAMESPACE),
            Err(StoreError::Serialization { .. })
        ));
    }

    #[test]
    fn test_namespace_validation() {
        let store = MemoryStore::new();
        for bad in ["", "a//b", "../etc", "Extensions/./x", "C:evil"] {
            assert!(
                matches!(store.load(bad), Err(StoreError::InvalidNamespace(_))),
                "{bad} should be rejected"
            );
        }
        assert!(store.load(&translations_namespace("greeter")).is_ok());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new().with(COMMANDS_NAMESPACE, json!({ "spy": {} }));
        assert!(!store.load(COMMANDS_NAMESPACE).unwrap().1);
        store.save(GROUPS_NAMESPACE, &json!({})).unwrap();
        assert_eq!(store.get(GROUPS_NAMESPACE), Some(json!({})));
    }
}
