//! Flat JSON key-value store for session values (cookies, tokens, ids).
//!
//! [`Storage`] owns its cache. Nothing is read until [`Storage::load`] or
//! [`Storage::data`] is called, and [`Storage::invalidate`] drops the
//! cache so the next access goes back to disk.

use crate::batch::write_atomic;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default storage directory, relative to the working directory
pub const DEFAULT_STORAGE_DIR: &str = ".storage";

/// File holding the session values
pub const DATA_FILE: &str = "data.json";

/// Stored key-value pairs
pub type Data = Map<String, Value>;

/// A directory of JSON documents with a cached `data.json`
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    cache: Option<Data>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DIR)
    }
}

impl Storage {
    /// Creates a store rooted at `dir`; nothing is read yet
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: None,
        }
    }

    /// The storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves a path inside the storage directory
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.join(relative)
    }

    /// Reads a JSON object document.
    ///
    /// A missing file is an empty object. So is a file that does not hold a
    /// JSON object, with a warning.
    pub fn read_json(&self, name: &str) -> Result<Data> {
        let path = self.resolve(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Data::new()),
            Err(e) => return Err(Error::file_read(&path, e)),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(data)) => Ok(data),
            Ok(_) => {
                warn!("{} does not contain a JSON object, ignoring it", path.display());
                Ok(Data::new())
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                Ok(Data::new())
            }
        }
    }

    /// Writes a JSON object document with two-space indentation
    pub fn write_json(&self, name: &str, data: &Data) -> Result<PathBuf> {
        let path = self.resolve(name);
        let content = serde_json::to_string_pretty(data)?;
        let outcome = write_atomic(&path, content.as_bytes())?;
        debug!("Saved {}", path.display());
        Ok(outcome.path().to_path_buf())
    }

    /// Reads `data.json` from disk, replacing the cache
    pub fn load(&mut self) -> Result<&Data> {
        let data = self.read_json(DATA_FILE)?;
        Ok(self.cache.insert(data))
    }

    /// The cached values, loading them on first use
    pub fn data(&mut self) -> Result<&Data> {
        if self.cache.is_none() {
            return self.load();
        }
        Ok(self.cache.get_or_insert_with(Data::new))
    }

    /// Looks up one value
    pub fn get(&mut self, key: &str) -> Result<Option<&Value>> {
        Ok(self.data()?.get(key))
    }

    /// Shallow-merges `patch` into the stored values and writes them back
    pub fn merge_save(&mut self, patch: Data) -> Result<&Data> {
        let mut merged = self.data()?.clone();
        merged.extend(patch);
        self.write_json(DATA_FILE, &merged)?;
        Ok(self.cache.insert(merged))
    }

    /// Drops the cache; the next access reads from disk again
    pub fn invalidate(&mut self) {
        self.cache = None;
    }
}
