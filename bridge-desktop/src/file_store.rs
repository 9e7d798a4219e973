//! Key-Value Storage backed by a JSON file

use bridge_traits::{
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_FILE_NAME: &str = "session.json";

/// File-backed key-value store
///
/// Keeps the whole map in memory and rewrites the file on every mutation.
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous contents intact.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupted file is logged and treated as empty; it is replaced on the
    /// next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Discarding unreadable key-value file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        debug!(path = ?path, keys = entries.len(), "Opened key-value file");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Open the store in the platform data directory, under `app_name`.
    pub fn open_default(app_name: &str) -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            BridgeError::NotAvailable("No platform data directory available".to_string())
        })?;
        Self::open(base.join(app_name).join(DEFAULT_FILE_NAME))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).map_err(|e| {
            BridgeError::StorageError(format!("Failed to serialize key-value file: {}", e))
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        let written = fs::write(&tmp_path, json).and_then(|_| fs::rename(&tmp_path, &self.path));

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                debug!(path = ?tmp_path, error = %cleanup, "Temp file not removed");
            }
            warn!(path = ?self.path, error = %e, "Failed to write key-value file");
            return Err(BridgeError::Io(e));
        }
        Ok(())
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> Result<T>,
    ) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BridgeError::StorageError("key-value file lock poisoned".to_string()))?;
        f(&mut entries)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
            self.flush(entries)
        })
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| Ok(entries.get(key).cloned()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            if entries.remove(key).is_some() {
                self.flush(entries)?;
            }
            Ok(())
        })
    }
}
