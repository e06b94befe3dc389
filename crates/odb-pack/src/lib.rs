//! Read-only access to version-2 pack files.
//!
//! # Architecture
//!
//! - **Pack file** (`.pack`): `PACK`, version 2, object count, then entries
//!   (type/size header, optional delta base, zlib data) and a SHA-1 trailer
//! - **Pack index** (`.idx`): fan-out table + sorted ids for O(log n) lookups,
//!   CRC32 and offset tables, large-offset table
//! - **PackReader**: random-access loads with ofs-delta chain resolution
//! - **PackCache**: opens each pack of a repository at most once
//! - **apply_delta**: the copy/insert delta instruction interpreter

pub mod cache;
pub mod delta;
pub mod entry;
pub mod error;
pub mod index;
pub mod mapped;
pub mod reader;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use cache::{pack_name_from_index, PackCache};
pub use delta::apply_delta;
pub use entry::{EntryHeader, PackObjectType};
pub use error::{PackError, PackResult};
pub use index::PackIndex;
pub use mapped::PackBytes;
pub use reader::PackReader;
