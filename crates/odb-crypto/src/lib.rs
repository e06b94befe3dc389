//! Hashing for the object database.
//!
//! Provides a from-scratch streaming SHA-1 ([`Sha1`]) and a kind-tagged
//! [`ContentHasher`] that computes object content addresses. SHA-1 is used
//! purely for content addressing; no stronger cryptographic property is
//! relied upon.

pub mod hasher;
pub mod sha1;

pub use hasher::ContentHasher;
pub use sha1::{sha1_hex, Sha1};
