//! Key/value persistence behind the mask cache
//!
//! Keys are `/`-separated paths such as `masks/<hash>`. Values are JSON text.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Backing store for cache entries
pub trait CacheStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite
    fn put(&mut self, key: &str, value: String) -> Result<()>;

    /// Returns true if the key existed
    fn remove(&mut self, key: &str) -> Result<bool>;

    /// Remove everything, returning how many keys were dropped
    fn clear(&mut self) -> Result<usize>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&mut self) -> Result<usize> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// One JSON file per key under a root directory
///
/// `masks/abc` is stored at `<root>/masks/abc.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

const EXTENSION: &str = "json";

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.split('/').all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && !segment.contains('\\')
            });
        if !valid {
            bail!("invalid cache key {:?}", key);
        }
        let mut path = self.root.clone();
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.{EXTENSION}"));
            }
        }
        Ok(path)
    }

    fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to list {}", dir.display()));
            }
        };
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() {
                Self::collect_keys(&path, &format!("{prefix}{name}/"), keys)?;
            } else if let Some(stem) = name.strip_suffix(&format!(".{EXTENSION}")) {
                keys.push(format!("{prefix}{stem}"));
            }
        }
        Ok(())
    }
}

impl CacheStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Write then rename so readers never see a partial file
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn clear(&mut self) -> Result<usize> {
        let keys = self.keys()?;
        for key in &keys {
            self.remove(key)?;
        }
        Ok(keys.len())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, "", &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}
