use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    /// Header, size, offset or delta data that does not add up.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// Wrong magic or version in a `.pack` or `.idx` header.
    #[error("unsupported {file} version: header {header}")]
    UnsupportedVersion { file: &'static str, header: String },

    /// A valid entry this reader does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("decompression failed at offset {offset}: {source}")]
    Decompression {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached open failure handed to a later caller of the same pack.
    #[error("{0}")]
    Shared(Arc<PackError>),
}

impl PackError {
    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// The underlying error, looking through [`PackError::Shared`].
    pub fn root(&self) -> &PackError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(
            self.root(),
            Self::Malformed { .. } | Self::UnsupportedVersion { .. }
        )
    }
}

pub type PackResult<T> = Result<T, PackError>;
