//! Small key-value store for scalar settings such as the retention watermark.

use super::StorageError;
use log::warn;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Key-value store holding `i64` settings.
///
/// Reads never fail: a missing or unreadable key yields `default`.
pub trait ConfigStore: Send + Sync {
    fn get_long(&self, key: &str, default: i64) -> i64;

    fn put_long(&self, key: &str, value: i64) -> Result<(), StorageError>;
}

/// Process-local [`ConfigStore`].
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, i64>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_long(&self, key: &str, default: i64) -> i64 {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).copied())
            .unwrap_or(default)
    }

    fn put_long(&self, key: &str, value: i64) -> Result<(), StorageError> {
        self.values.write()?.insert(key.to_string(), value);
        Ok(())
    }
}

/// [`ConfigStore`] persisted as a JSON object in a single file.
///
/// Writes go to a temporary file first and then replace the original, so a
/// crash mid-write leaves the previous values intact.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    values: RwLock<HashMap<String, i64>>,
}

impl FileConfigStore {
    /// Opens the store at `path`. A missing file starts out empty; a corrupted
    /// one is logged and treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let values = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(
                    "Ignoring unreadable config store {}: {}",
                    path.display(),
                    e
                );
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &HashMap<String, i64>) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("json.tmp");
        let mut temp_file = File::create(&temp_path)?;
        temp_file.write_all(serde_json::to_string(values)?.as_bytes())?;
        temp_file.flush()?;
        drop(temp_file);
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get_long(&self, key: &str, default: i64) -> i64 {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).copied())
            .unwrap_or(default)
    }

    fn put_long(&self, key: &str, value: i64) -> Result<(), StorageError> {
        let mut values = self.values.write()?;
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.persist(&values) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
