//! A git-compatible object database.
//!
//! [`Database`] ties the lower layers together: objects are framed and
//! hashed by `odb-store`, written loose through a [`Storage`](odb_store::Storage)
//! backend, read back from loose files or `odb-pack` packs, and named by the
//! refs of `odb-refs`.
//!
//! ```no_run
//! use odb_database::Database;
//! use odb_store::{Blob, Object};
//!
//! # fn main() -> odb_database::DbResult<()> {
//! let db = Database::open("/tmp/repo.git");
//! db.init()?;
//! let id = db.save_as(&Object::Blob(Blob::from("hello\n")))?;
//! db.set_ref("refs/heads/master", &id)?;
//! assert_eq!(db.resolve("HEAD")?, Some(id));
//! # Ok(())
//! # }
//! ```
//!
//! [`AsyncDatabase`] offers the same operations to async callers by running
//! them on tokio's blocking pool.

pub mod config;
pub mod database;
pub mod error;
pub mod task;

pub use config::DatabaseConfig;
pub use database::{Database, DEFAULT_BRANCH, DEFAULT_CONFIG, PACK_DIR};
pub use error::{DbError, DbResult};
pub use task::AsyncDatabase;

pub use odb_pack::PackError;
pub use odb_refs::{RefError, RefStore};
pub use odb_store::{Object, ObjectKind, StoreError};
pub use odb_types::ObjectId;
