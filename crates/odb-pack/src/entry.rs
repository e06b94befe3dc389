//! Pack entry headers: object type codes, sizes and ofs-delta distances.

use odb_store::ObjectKind;

use crate::error::{PackError, PackResult};

/// Type code of a packed entry (bits 4-6 of its first header byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PackObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta against an earlier entry of the same pack, by backward offset.
    OfsDelta,
    /// Delta against an object named by hash.
    RefDelta,
}

impl PackObjectType {
    /// Decode a 3-bit type code. Codes 0 and 5 are reserved.
    pub fn from_code(code: u8) -> PackResult<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            other => Err(PackError::malformed(
                "pack entry",
                format!("reserved type code {other}"),
            )),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta => 6,
            Self::RefDelta => 7,
        }
    }

    /// The object kind for non-delta entries. Deltas inherit their base's kind.
    pub fn object_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::OfsDelta | Self::RefDelta)
    }
}

/// Decoded entry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: PackObjectType,
    /// Inflated size of the entry data (the delta stream, for deltas).
    pub size: u64,
    /// Bytes consumed by the type/size header.
    pub header_len: usize,
}

/// Parse the type/size header at the start of `data`.
///
/// Size bits: low 4 bits of the first byte, then 7 bits per continuation byte.
pub fn parse_entry_header(data: &[u8]) -> PackResult<EntryHeader> {
    let truncated = || PackError::malformed("pack entry", "truncated header");

    let first = *data.first().ok_or_else(truncated)?;
    let kind = PackObjectType::from_code((first >> 4) & 0x07)?;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4;
    let mut pos = 1;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(truncated)?;
        pos += 1;
        if shift > 57 {
            return Err(PackError::malformed("pack entry", "size varint too long"));
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Ok(EntryHeader {
        kind,
        size,
        header_len: pos,
    })
}

/// Parse an ofs-delta base distance. Returns `(distance, bytes consumed)`.
///
/// Unlike the size header this encoding adds one before each shift, so every
/// distance has exactly one representation.
pub fn parse_ofs_distance(data: &[u8]) -> PackResult<(u64, usize)> {
    let truncated = || PackError::malformed("ofs-delta", "truncated base distance");

    let mut byte = *data.first().ok_or_else(truncated)?;
    let mut value = u64::from(byte & 0x7f);
    let mut pos = 1;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(truncated)?;
        pos += 1;
        value = value
            .checked_add(1)
            .and_then(|v| v.checked_mul(1 << 7))
            .ok_or_else(|| PackError::malformed("ofs-delta", "base distance overflows"))?
            | u64::from(byte & 0x7f);
    }
    Ok((value, pos))
}
