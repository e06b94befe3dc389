use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::StoreResult;
use crate::traits::{normalize_file_path, normalize_path, NameIter, Storage};

/// Directory-backed store.
///
/// Every call opens and closes its own file handles; nothing is held between
/// calls. Writes go through a temporary file in the destination directory so
/// a crash never leaves a half-written object or ref behind.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        Ok(self.root.join(normalize_file_path(path)?))
    }

    fn resolve_dir(&self, path: &str) -> StoreResult<PathBuf> {
        let normalized = normalize_path(path)?;
        Ok(if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        })
    }

    fn temp_in_parent(&self, dest: &Path, data: &[u8]) -> StoreResult<NamedTempFile> {
        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_data()?;
        Ok(tmp)
    }

    fn list(&self, path: &str, want_dirs: bool) -> StoreResult<NameIter<'_>> {
        let dir = self.resolve_dir(path)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(e.into()),
        };
        Ok(Box::new(entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            match entry.file_type() {
                Ok(ft) if ft.is_dir() == want_dirs => {
                    Some(Ok(entry.file_name().to_string_lossy().into_owned()))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        })))
    }
}

impl Storage for FsStorage {
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let dest = self.resolve(path)?;
        let tmp = self.temp_in_parent(&dest, data)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        trace!(path, bytes = data.len(), "wrote file");
        Ok(())
    }

    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let dest = self.resolve(path)?;
        if dest.exists() {
            debug!(path, "put skipped: already present");
            return Ok(());
        }
        let tmp = self.temp_in_parent(&dest, data)?;
        match tmp.persist_noclobber(&dest) {
            Ok(_) => {
                trace!(path, bytes = data.len(), "created file");
                Ok(())
            }
            // Lost a race with another writer of the same content.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path, "put skipped: already present");
                Ok(())
            }
            Err(e) => Err(e.error.into()),
        }
    }

    fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let dest = self.resolve(path)?;
        let mut file = match File::open(&dest) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let dest = self.resolve(path)?;
        match fs::remove_file(&dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let mut dir = dest.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if fs::read_dir(current)?.next().is_some() {
                break;
            }
            fs::remove_dir(current)?;
            trace!(dir = %current.display(), "removed empty directory");
            dir = current.parent();
        }
        Ok(true)
    }

    fn nodes(&self, path: &str) -> StoreResult<NameIter<'_>> {
        self.list(path, true)
    }

    fn leaves(&self, path: &str) -> StoreResult<NameIter<'_>> {
        self.list(path, false)
    }

    fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}
