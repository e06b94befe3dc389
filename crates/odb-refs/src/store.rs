//! [`StorageRefs`]: refs kept as files in a [`Storage`] backend.

use std::sync::Arc;

use odb_store::Storage;
use odb_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::{PackedRefs, RefTarget};

/// Symbolic refs followed before giving up.
const MAX_SYMREF_DEPTH: usize = 5;

const HEAD: &str = "HEAD";
const PACKED_REFS: &str = "packed-refs";

/// Refs stored as loose files plus a read-only `packed-refs` overlay.
///
/// Shares its backend with the object database; `packed-refs` is read on
/// every lookup and never rewritten.
pub struct StorageRefs<S: Storage + ?Sized> {
    storage: Arc<S>,
}

impl<S: Storage + ?Sized> StorageRefs<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn read_target(&self, name: &str) -> Result<Option<RefTarget>> {
        match self.storage.read(name)? {
            Some(bytes) => RefTarget::parse(name, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Like `read_target`, but a path that is a directory or holds neither a
    /// hash nor `ref: ` counts as no loose ref.
    fn read_loose(&self, name: &str) -> Result<Option<RefTarget>> {
        if !self.storage.exists(name)? {
            return Ok(None);
        }
        match self.read_target(name) {
            Err(RefError::Malformed { reason, .. }) => {
                debug!(name, reason = reason.as_str(), "not a ref file, ignoring");
                Ok(None)
            }
            other => other,
        }
    }

    fn packed(&self) -> Result<PackedRefs> {
        match self.storage.read(PACKED_REFS)? {
            Some(bytes) => PackedRefs::parse(&bytes),
            None => Ok(PackedRefs::default()),
        }
    }

    fn lookup(&self, name: &str, depth: usize) -> Result<Option<ObjectId>> {
        match self.read_loose(name)? {
            Some(RefTarget::Direct(id)) => Ok(Some(id)),
            Some(RefTarget::Symbolic(target)) => {
                if depth >= MAX_SYMREF_DEPTH {
                    return Err(RefError::malformed(
                        name,
                        format!("more than {MAX_SYMREF_DEPTH} levels of symbolic refs"),
                    ));
                }
                debug!(from = name, to = target.as_str(), "following symbolic ref");
                self.lookup(&target, depth + 1)
            }
            None => Ok(self.packed()?.get(name)),
        }
    }

    /// Loose children merged with packed names below `prefix`.
    fn children(&self, prefix: &str, want_dirs: bool) -> Result<Vec<String>> {
        let loose = if want_dirs {
            self.storage.nodes(prefix)?
        } else {
            self.storage.leaves(prefix)?
        };
        let mut names: Vec<String> = loose.collect::<std::result::Result<_, _>>()?;

        let dir = prefix.trim_end_matches('/');
        let packed = self.packed()?;
        for name in packed.names() {
            let Some(rest) = name.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) else {
                continue;
            };
            let child = match (rest.split_once('/'), want_dirs) {
                (Some((node, _)), true) => node,
                (None, false) => rest,
                _ => continue,
            };
            if !names.iter().any(|n| n == child) {
                names.push(child.to_string());
            }
        }
        Ok(names)
    }
}

impl<S: Storage + ?Sized> RefStore for StorageRefs<S> {
    fn head(&self) -> Result<Option<RefTarget>> {
        self.read_target(HEAD)
    }

    fn update_head(&self, target: &str) -> Result<()> {
        validate_ref_name(target)?;
        let contents = RefTarget::Symbolic(target.to_string()).to_string();
        self.storage.write(HEAD, contents.as_bytes())?;
        Ok(())
    }

    fn get_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        self.lookup(name, 0)
    }

    fn set_ref(&self, name: &str, id: &ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let contents = RefTarget::Direct(*id).to_string();
        self.storage.write(name, contents.as_bytes())?;
        Ok(())
    }

    fn ref_nodes(&self, prefix: &str) -> Result<Vec<String>> {
        self.children(prefix, true)
    }

    fn ref_leaves(&self, prefix: &str) -> Result<Vec<String>> {
        self.children(prefix, false)
    }
}

impl<S: Storage + ?Sized> std::fmt::Debug for StorageRefs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRefs").finish_non_exhaustive()
    }
}
