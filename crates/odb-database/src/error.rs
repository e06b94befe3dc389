use odb_store::ObjectKind;
use odb_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// `load_as` found an object of a different kind.
    #[error("object {id} is a {actual}, expected {expected}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// A loose object file is not a valid zlib stream.
    #[error("loose object {id} failed to inflate: {source}")]
    Decompression {
        id: ObjectId,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] odb_store::StoreError),

    #[error("pack error: {0}")]
    Pack(#[from] odb_pack::PackError),

    #[error("ref error: {0}")]
    Ref(#[from] odb_refs::RefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task of [`AsyncDatabase`](crate::AsyncDatabase) panicked or
    /// was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

pub type DbResult<T> = Result<T, DbError>;
