//! File-backed state store
//!
//! One pretty-printed JSON document per key under a data directory. Writes go
//! to a temporary file that is renamed over the target, so a crash never
//! leaves a half-written record behind.

use modshield_core::{Error, Result, StateStore};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `StateStore` writing `<dir>/<key>.json`
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::storage(format!("failed to create data dir {}: {}", dir.display(), e))
        })?;
        debug!(dir = %dir.display(), "Opened state store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Data directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::storage(format!("invalid record key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Stored record is corrupt");
                Err(Error::storage(format!("record '{}' is corrupt: {}", key, e)))
            }
        }
    }

    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(value)?;

        let _guard = self.write_lock.lock();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = body.len(), "Saved record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_core::StateStoreExt;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        assert_eq!(store.load("rotation_cursor").unwrap(), None);
        store.save_as("rotation_cursor", &3usize).unwrap();
        assert_eq!(store.load_as::<usize>("rotation_cursor").unwrap(), Some(3));
        assert!(dir.path().join("rotation_cursor.json").exists());
        assert!(!dir.path().join("rotation_cursor.json.tmp").exists());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        JsonFileStore::open(dir.path())
            .unwrap()
            .save_as("whitelist", &serde_json::json!({"users": [1]}))
            .unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        let value = reopened.load("whitelist").unwrap().unwrap();
        assert_eq!(value["users"][0], 1);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.load("../escape").is_err());
        assert!(store.save("", &serde_json::Value::Null).is_err());
    }

    #[test]
    fn test_corrupt_record_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.load("config").is_err());
    }
}
