//! Named references for the object database.
//!
//! References are the human-readable entry points into the object graph:
//! `HEAD` names the current branch, loose ref files under `refs/` hold a
//! 40-hex id, and `packed-refs` supplies ids for refs with no loose file.
//!
//! # Modules
//!
//! - [`error`] -- Error types for ref operations
//! - [`types`] -- Ref file contents: [`RefTarget`], [`PackedRefs`]
//! - [`traits`] -- The [`RefStore`] trait, including revision resolution
//! - [`names`] -- Ref name validation
//! - [`store`] -- [`StorageRefs`], refs kept in any `Storage` backend

pub mod error;
pub mod names;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use names::validate_ref_name;
pub use store::StorageRefs;
pub use traits::RefStore;
pub use types::{PackedRefs, RefTarget};
