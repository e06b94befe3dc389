/// Errors from object codec and content storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Encoded bytes do not follow the expected layout.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A tree was built with two entries of the same name.
    #[error("duplicate tree entry: {0}")]
    DuplicateEntry(String),

    /// A storage path escapes the root or is otherwise unusable.
    #[error("invalid storage path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The in-memory backend's lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
