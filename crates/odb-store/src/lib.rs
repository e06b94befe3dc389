//! Object model, canonical codec, and path-addressed storage backends.
//!
//! Every object (blob, tree, commit, tag) is identified by the SHA-1 of its
//! framed bytes `"<kind> <len>\0<body>"`. This crate knows how to build those
//! bytes and how to parse them back, and provides the byte stores the
//! database layer keeps loose objects and refs in.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- snapshot pointer with parents and authorship
//! - [`Tag`] -- annotated tag
//!
//! # Storage Backends
//!
//! All backends implement the [`Storage`] trait:
//!
//! - [`FsStorage`] -- directory on disk, atomic writes via temp-file rename
//! - [`InMemoryStorage`] -- map-based store for tests and embedding

pub mod codec;
pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use codec::{decode, deframe, encode, frame, frame_object};
pub use error::{StoreError, StoreResult};
pub use fs::FsStorage;
pub use memory::InMemoryStorage;
pub use object::{
    Blob, Commit, EntryMode, Object, ObjectKind, Person, PersonDate, RawObject, Tag, Tree,
    TreeEntry,
};
pub use traits::{normalize_path, NameIter, Storage};
