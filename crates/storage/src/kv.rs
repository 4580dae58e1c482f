use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use snafu::ResultExt;

use crate::error::{
    CreateDirectorySnafu, ParseStoreSnafu, ReadStoreSnafu, RenameTempFileSnafu,
    SerializeStoreSnafu, StorageResult, WriteFileSnafu,
};

/// Durable string map shared by client-side state.
///
/// Multi-key writes are all-or-nothing from the perspective of a later read,
/// and `get_entries` answers every key from one snapshot.
pub trait KeyValueStore: Send + Sync {
    /// Values in the order of `keys`.
    fn get_entries(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>>;
    fn set_entries(&self, entries: &[(&str, &str)]) -> StorageResult<()>;
    fn remove_entries(&self, keys: &[&str]) -> StorageResult<()>;

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get_entries(&[key])?.pop().flatten())
    }
}

/// Whole-file JSON object store replaced via write-to-temp and rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles issued through one handle.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path).context(ReadStoreSnafu {
            stage: "read-store-file",
            path: self.path.clone(),
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).context(ParseStoreSnafu {
            stage: "parse-store-file",
            path: self.path.clone(),
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirectorySnafu {
                stage: "create-store-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(map).context(SerializeStoreSnafu {
            stage: "serialize-store-json",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-store-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-store-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::debug!("saved key-value store to {:?}", self.path);
        Ok(())
    }

    fn modify(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = self.read_map()?;
        apply(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_entries(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>> {
        let mut map = self.read_map()?;
        Ok(keys.iter().map(|key| map.remove(*key)).collect())
    }

    fn set_entries(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.modify(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn remove_entries(&self, keys: &[&str]) -> StorageResult<()> {
        if !self.path.exists() {
            return Ok(());
        }

        self.modify(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_entries(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>> {
        let map = self.entries();
        Ok(keys.iter().map(|key| map.get(*key).cloned()).collect())
    }

    fn set_entries(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        let mut map = self.entries();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_entries(&self, keys: &[&str]) -> StorageResult<()> {
        let mut map = self.entries();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}
