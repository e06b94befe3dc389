//! Foundation types for the object database.
//!
//! Every other `odb-*` crate depends on `odb-types` for the content address
//! of stored objects.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- 160-bit SHA-1 content address, 40-hex text form

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::ObjectId;
