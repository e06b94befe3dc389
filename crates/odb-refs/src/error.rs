//! Error types for reference operations.

use odb_store::StoreError;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The ref name is not acceptable as a path under the repository.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A ref file, `HEAD` or `packed-refs` line has unexpected contents.
    #[error("malformed ref {name}: {reason}")]
    Malformed { name: String, reason: String },

    /// HEAD holds a hash instead of naming a branch.
    #[error("HEAD is detached")]
    DetachedHead,

    /// Failure in the underlying storage.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RefError {
    pub(crate) fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
