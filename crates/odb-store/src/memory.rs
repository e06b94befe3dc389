use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::traits::{normalize_file_path, normalize_path, NameIter, Storage};

/// In-memory, map-based store.
///
/// Intended for tests and embedding. Directories are implicit: a directory
/// exists while some file lives beneath it, so `remove` prunes for free.
/// Listings are snapshotted at call time.
pub struct InMemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.files.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored paths in sorted order.
    pub fn paths(&self) -> StoreResult<Vec<String>> {
        Ok(self.read_lock()?.keys().cloned().collect())
    }

    fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn children(&self, path: &str, want_dirs: bool) -> StoreResult<NameIter<'_>> {
        let dir = normalize_path(path)?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let map = self.read_lock()?;
        let mut names = BTreeSet::new();
        for key in map.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match (rest.split_once('/'), want_dirs) {
                (Some((child, _)), true) => {
                    names.insert(child.to_string());
                }
                (None, false) => {
                    names.insert(rest.to_string());
                }
                _ => {}
            }
        }
        Ok(Box::new(names.into_iter().map(Ok)))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let key = normalize_file_path(path)?;
        self.write_lock()?.insert(key, data.to_vec());
        Ok(())
    }

    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let key = normalize_file_path(path)?;
        self.write_lock()?
            .entry(key)
            .or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = normalize_file_path(path)?;
        Ok(self.read_lock()?.get(&key).cloned())
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let key = normalize_file_path(path)?;
        Ok(self.write_lock()?.remove(&key).is_some())
    }

    fn nodes(&self, path: &str) -> StoreResult<NameIter<'_>> {
        self.children(path, true)
    }

    fn leaves(&self, path: &str) -> StoreResult<NameIter<'_>> {
        self.children(path, false)
    }

    fn exists(&self, path: &str) -> StoreResult<bool> {
        let key = normalize_file_path(path)?;
        Ok(self.read_lock()?.contains_key(&key))
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("file_count", &self.len())
            .finish()
    }
}
