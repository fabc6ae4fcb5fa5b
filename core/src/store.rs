use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Durable mapping from image identifier (path or filename) to its
/// natural-language description. Persisted as one pretty-printed JSON
/// document, read wholesale and written wholesale.
///
/// A BTreeMap keeps key order stable, so the serialized document and the
/// numbering inside ranking prompts are deterministic across runs.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptionStore {
    entries: BTreeMap<String, String>,
}

impl DescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`. A missing file means "no index yet" and a
    /// file that fails to parse is treated the same way; both degrade to an
    /// empty store rather than failing the caller. The corrupt case is logged
    /// so it stays observable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "store file unreadable, starting with empty index");
                Self::new()
            }
        }
    }

    /// Serialize the full mapping and overwrite `path` in one operation.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.entries.get(identifier).map(|s| s.as_str())
    }

    /// Insert a description for an identifier. Callers only insert non-empty
    /// descriptions; a failed describe attempt never reaches this point.
    pub fn insert(&mut self, identifier: String, description: String) {
        self.entries.insert(identifier, description);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::load(dir.path().join("nope.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptions.json");
        fs::write(&path, "{ not valid json").unwrap();
        let store = DescriptionStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptions.json");

        let mut store = DescriptionStore::new();
        store.insert("shots/login.png".into(), "A login form with a blue Submit button".into());
        store.insert("shots/sunset.jpg".into(), "An orange sunset over the ocean.".into());
        store.save(&path).unwrap();

        let loaded = DescriptionStore::load(&path);
        assert_eq!(loaded, store);
    }

    #[test]
    fn save_fully_replaces_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptions.json");

        let mut first = DescriptionStore::new();
        first.insert("a.png".into(), "first".into());
        first.insert("b.png".into(), "second".into());
        first.save(&path).unwrap();

        let mut second = DescriptionStore::new();
        second.insert("c.png".into(), "third".into());
        second.save(&path).unwrap();

        let loaded = DescriptionStore::load(&path);
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.contains("a.png"));
        assert_eq!(loaded.get("c.png"), Some("third"));
    }
}
