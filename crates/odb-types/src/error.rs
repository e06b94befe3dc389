use thiserror::Error;

/// Errors from parsing an [`ObjectId`](crate::ObjectId).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Not 40 lowercase hex digits.
    #[error("invalid object id {0}")]
    InvalidHex(String),

    /// A raw digest slice was not 20 bytes.
    #[error("object id must be {expected} bytes or hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
