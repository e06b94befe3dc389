//! The [`RefStore`] trait defining the reference storage interface.

use odb_types::ObjectId;

use crate::error::Result;
use crate::types::RefTarget;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`). The namespace
/// follows the on-disk layout:
///
/// - `HEAD` names the current branch (`ref: refs/heads/master`)
/// - `refs/heads/*` for branches, `refs/tags/*` for tags
/// - `packed-refs` as a read-only overlay consulted when no loose file exists
pub trait RefStore: Send + Sync {
    /// Raw contents of `HEAD`. Returns `Ok(None)` if HEAD has not been set.
    fn head(&self) -> Result<Option<RefTarget>>;

    /// Point HEAD at the ref `target` (e.g. `refs/heads/master`).
    fn update_head(&self, target: &str) -> Result<()>;

    /// Read a ref by its full name, following symbolic refs and falling back
    /// to `packed-refs`.
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn get_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Overwrite a loose ref with `id`.
    fn set_ref(&self, name: &str, id: &ObjectId) -> Result<()>;

    /// Child ref directories under `prefix` (loose and packed).
    fn ref_nodes(&self, prefix: &str) -> Result<Vec<String>>;

    /// Child ref names under `prefix` (loose and packed).
    fn ref_leaves(&self, prefix: &str) -> Result<Vec<String>>;

    /// The ref HEAD names.
    ///
    /// Returns `Ok(None)` if HEAD is unset and `Err(DetachedHead)` if it holds
    /// a hash.
    fn get_head(&self) -> Result<Option<String>> {
        match self.head()? {
            Some(RefTarget::Symbolic(name)) => Ok(Some(name)),
            Some(RefTarget::Direct(_)) => Err(crate::error::RefError::DetachedHead),
            None => Ok(None),
        }
    }

    /// Turn a user-supplied revision into an object id.
    ///
    /// In order: a literal 40-hex hash; `HEAD`; the name as given; then
    /// `refs/heads/<rev>` and `refs/tags/<rev>`.
    fn resolve(&self, rev: &str) -> Result<Option<ObjectId>> {
        if ObjectId::is_hex(rev) {
            return Ok(ObjectId::from_hex(rev).ok());
        }
        if rev == "HEAD" {
            return match self.head()? {
                Some(RefTarget::Direct(id)) => Ok(Some(id)),
                Some(RefTarget::Symbolic(name)) => self.get_ref(&name),
                None => Ok(None),
            };
        }
        for candidate in [
            rev.to_string(),
            format!("refs/heads/{rev}"),
            format!("refs/tags/{rev}"),
        ] {
            if let Some(id) = self.get_ref(&candidate)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Every ref under `prefix` with its id, depth-first in name order.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let mut out = Vec::new();
        let mut leaves = self.ref_leaves(prefix)?;
        leaves.sort();
        for leaf in leaves {
            let name = join(prefix, &leaf);
            if let Some(id) = self.get_ref(&name)? {
                out.push((name, id));
            }
        }
        let mut nodes = self.ref_nodes(prefix)?;
        nodes.sort();
        for node in nodes {
            out.extend(self.list_refs(&join(prefix, &node))?);
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn join(prefix: &str, child: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        child.to_string()
    } else {
        format!("{prefix}/{child}")
    }
}
