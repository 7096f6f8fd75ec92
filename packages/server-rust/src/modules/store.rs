//! JSON-file persistence for module-owned registries.

use std::io::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use coman_core::ModuleMessage;
use parking_lot::Mutex;
use serde_json::Value;

/// A message persisted as a pretty-printed JSON file.
///
/// A missing file reads as the default message. Read-modify-write cycles
/// through [`JsonStore::update`] are serialised per store, and each save
/// replaces the file atomically through a sibling temporary file.
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _message: PhantomData<fn() -> T>,
}

impl<T: ModuleMessage> JsonStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _message: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> anyhow::Result<T> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Loads, applies `f`, saves and returns what `f` returned.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> anyhow::Result<R> {
        let _guard = self.lock.lock();
        let mut message = self.read()?;
        let result = f(&mut message);
        self.write(&message)?;
        Ok(result)
    }

    fn read(&self) -> anyhow::Result<T> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let text = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
        let value: Value = serde_json::from_str(text)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(T::from_payload(value))
    }

    fn write(&self, message: &T) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let body = serde_json::to_string_pretty(message)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage a write in {}", dir.display()))?;
        staged
            .write_all(body.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        staged
            .persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use coman_core::messages::{ToolDefinition, ToolRegistry};

    use super::*;

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<ToolRegistry> = JsonStore::new(dir.path().join("tools.json"));
        assert!(store.load().unwrap().tools.is_empty());
    }

    #[test]
    fn update_persists_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<ToolRegistry> = JsonStore::new(dir.path().join("nested/tools.json"));
        let count = store
            .update(|registry| {
                registry.upsert(ToolDefinition::new("text.uppercase", "get", "/v1/text/uppercase"));
                registry.tools.len()
            })
            .unwrap();
        assert_eq!(count, 1);
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.names(), vec!["text.uppercase"]);
    }

    #[test]
    fn save_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(&path, r#"{"tools": [{"name": "old", "path": "/old"}]}"#).unwrap();
        let store: JsonStore<ToolRegistry> = JsonStore::new(&path);
        store
            .update(|registry| registry.upsert(ToolDefinition::new("new", "post", "/new")))
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["tools.json"]);
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["tools"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(&path, "\u{feff}{\"tools\": [{\"name\": \"a\", \"path\": \"/a\"}]}").unwrap();
        let store: JsonStore<ToolRegistry> = JsonStore::new(path);
        assert_eq!(store.load().unwrap().tools[0].method, "GET");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(&path, "{not json").unwrap();
        let store: JsonStore<ToolRegistry> = JsonStore::new(path);
        assert!(store.load().unwrap_err().to_string().contains("failed to parse"));
    }
}
