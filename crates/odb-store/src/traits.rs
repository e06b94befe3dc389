use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Lazy sequence of child names produced by [`Storage::nodes`] and
/// [`Storage::leaves`]. Finite and not restartable.
pub type NameIter<'a> = Box<dyn Iterator<Item = StoreResult<String>> + Send + 'a>;

/// Path-addressed byte store underneath the object database.
///
/// Paths are `/`-separated and relative to the store root (`HEAD`,
/// `refs/heads/master`, `objects/ab/cdef...`). All implementations must
/// satisfy these invariants:
/// - `put` is write-once: if the path exists it is left untouched and the
///   call succeeds.
/// - `write` replaces atomically; readers see the old or the new bytes, never
///   a mix.
/// - A missing path is never an error for `read`, `nodes` or `leaves`.
/// - All other I/O errors are propagated, never silently ignored.
pub trait Storage: Send + Sync {
    /// Replace the bytes at `path`, creating parent directories as needed.
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Create `path` with `data` unless it already exists.
    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Read the bytes at `path`.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `path` and any parent directories left empty.
    ///
    /// Returns `true` if the path existed.
    fn remove(&self, path: &str) -> StoreResult<bool>;

    /// Child directory names under `path`.
    fn nodes(&self, path: &str) -> StoreResult<NameIter<'_>>;

    /// Child file names under `path`.
    fn leaves(&self, path: &str) -> StoreResult<NameIter<'_>>;

    /// Check whether `path` holds data.
    ///
    /// Default implementation reads the whole value. Backends may override.
    fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.read(path)?.is_some())
    }

    /// Filesystem directory backing this store, if any. Pack files can only
    /// be memory-mapped from a real directory.
    fn root(&self) -> Option<&Path> {
        None
    }
}

/// Normalize a store path: drop empty and `.` segments, reject absolute
/// paths and `..`.
///
/// An empty result denotes the store root and is only valid for directory
/// listings.
pub fn normalize_path(path: &str) -> StoreResult<String> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid("parent segments are not allowed")),
            s if s.contains('\0') || s.contains('\\') => {
                return Err(invalid("segment contains a reserved character"))
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Normalize a path that must name a file.
pub(crate) fn normalize_file_path(path: &str) -> StoreResult<String> {
    let normalized = normalize_path(path)?;
    if normalized.is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty".into(),
        });
    }
    Ok(normalized)
}
