//! Durable key-value storage capability used to persist variant snapshots.
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::Result;

/// Whole-value key-value storage.
///
/// The store persists a complete snapshot per key, so implementations only
/// need atomic put/get/delete of a single value. Errors surface as
/// [`Error::Persistence`](crate::Error::Persistence).
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`. Returns `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically replace the value stored under `key`. Either the whole new
    /// value is observable afterwards or the old one is.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the value stored under `key`. Removing an absent key is not an
    /// error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage. Variants do not survive the process; useful as the
/// default backend and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let values = self.values.lock().expect("storage lock should not be poisoned");
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut values = self.values.lock().expect("storage lock should not be poisoned");
        values.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().expect("storage lock should not be poisoned");
        values.remove(key);
        Ok(())
    }
}

/// File-backed storage: one file per key under a configured directory.
///
/// Writes go to a temporary file first and are moved into place with
/// `rename`, which is atomic on the same filesystem.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<FileStorage> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileStorage { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        // Instance names may contain characters that are not filename-safe
        // (the default is "$default_instance").
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
