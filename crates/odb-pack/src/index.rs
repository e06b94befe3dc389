//! Version-2 pack index (`.idx`) parsing and lookup.

use odb_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::mapped::PackBytes;

/// Index v2 magic: `\377tOc`.
pub const INDEX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
pub const INDEX_VERSION: u32 = 2;

const HEADER_LEN: usize = 8;
const FAN_OUT_LEN: usize = 256 * 4;
/// Pack checksum followed by the index's own checksum.
const TRAILER_LEN: usize = 40;
/// Every pack ends in a 20-byte checksum of everything before it.
pub const PACK_TRAILER_LEN: u64 = 20;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Parsed pack index (version 2).
///
/// Layout after the 8-byte header:
/// - fan-out table: 256 big-endian counts of ids with first byte <= i
/// - N sorted 20-byte ids
/// - N CRC32s of the raw packed entries
/// - N 4-byte offsets; MSB set means "index into the large-offset table"
/// - large-offset table of 8-byte offsets
/// - pack checksum, index checksum
///
/// Offsets and entry lengths are decoded once at open time and never change.
#[derive(Debug)]
pub struct PackIndex {
    data: PackBytes,
    fan_out: [u32; 256],
    count: usize,
    /// Per entry, in id order.
    offsets: Vec<u64>,
    /// Per entry, in id order: bytes from the entry start to the next entry.
    lengths: Vec<u64>,
    /// `(offset, entry)` sorted by offset.
    by_offset: Vec<(u64, u32)>,
}

impl PackIndex {
    /// Parse an index for a pack of `pack_size` bytes.
    pub fn parse(data: impl Into<PackBytes>, pack_size: u64) -> PackResult<Self> {
        let data = data.into();
        if data.len() < HEADER_LEN || data[..4] != INDEX_MAGIC || read_u32(&data, 4) != INDEX_VERSION
        {
            return Err(PackError::UnsupportedVersion {
                file: "index",
                header: hex::encode(&data[..data.len().min(HEADER_LEN)]),
            });
        }
        if data.len() < HEADER_LEN + FAN_OUT_LEN {
            return Err(PackError::malformed("index", "fan-out table truncated"));
        }

        let mut fan_out = [0u32; 256];
        let mut previous = 0;
        for (i, slot) in fan_out.iter_mut().enumerate() {
            *slot = read_u32(&data, HEADER_LEN + i * 4);
            if *slot < previous {
                return Err(PackError::malformed(
                    "index",
                    format!("fan-out decreases at bucket {i:02x}"),
                ));
            }
            previous = *slot;
        }

        let count = fan_out[255] as usize;
        let layout = Layout::new(count);
        if data.len() < layout.large_offsets + TRAILER_LEN {
            return Err(PackError::malformed(
                "index",
                format!("{} bytes cannot hold {count} entries", data.len()),
            ));
        }
        let large_count = (data.len() - TRAILER_LEN - layout.large_offsets) / 8;

        let object_end = pack_size.saturating_sub(PACK_TRAILER_LEN);
        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let raw = read_u32(&data, layout.offsets + i * 4);
            let offset = if raw & LARGE_OFFSET_FLAG != 0 {
                let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
                if slot >= large_count {
                    return Err(PackError::malformed(
                        "index",
                        format!("large offset slot {slot} outside table of {large_count}"),
                    ));
                }
                read_u64(&data, layout.large_offsets + slot * 8)
            } else {
                u64::from(raw)
            };
            if offset < 12 || offset >= object_end {
                return Err(PackError::malformed(
                    "index",
                    format!("offset {offset} outside pack of {pack_size} bytes"),
                ));
            }
            offsets.push(offset);
        }

        let mut by_offset: Vec<(u64, u32)> = offsets
            .iter()
            .enumerate()
            .map(|(i, &off)| (off, i as u32))
            .collect();
        by_offset.sort_unstable();

        let mut lengths = vec![0u64; count];
        for (pos, &(offset, entry)) in by_offset.iter().enumerate() {
            let next = by_offset
                .get(pos + 1)
                .map(|&(next, _)| next)
                .unwrap_or(object_end);
            if next == offset {
                return Err(PackError::malformed(
                    "index",
                    format!("two entries share offset {offset}"),
                ));
            }
            lengths[entry as usize] = next - offset;
        }

        Ok(Self {
            data,
            fan_out,
            count,
            offsets,
            lengths,
            by_offset,
        })
    }

    /// Number of objects in the pack.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn fan_out(&self) -> &[u32; 256] {
        &self.fan_out
    }

    /// Entry position of `id`, if present.
    pub fn lookup(&self, id: &ObjectId) -> Option<usize> {
        let bucket = id.first_byte() as usize;
        let start = if bucket == 0 {
            0
        } else {
            self.fan_out[bucket - 1] as usize
        };
        let end = self.fan_out[bucket] as usize;

        let (mut lo, mut hi) = (start, end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.hash_bytes(mid).cmp(id.as_bytes()) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Id of entry `i`.
    pub fn id_at(&self, i: usize) -> ObjectId {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(self.hash_bytes(i));
        ObjectId::from_hash(hash)
    }

    /// Pack offset of entry `i`.
    pub fn offset_at(&self, i: usize) -> u64 {
        self.offsets[i]
    }

    /// Raw (still compressed) byte length of entry `i`.
    pub fn length_at(&self, i: usize) -> u64 {
        self.lengths[i]
    }

    /// CRC32 of the raw bytes of entry `i`.
    pub fn crc32_at(&self, i: usize) -> u32 {
        read_u32(&self.data, Layout::new(self.count).crcs + i * 4)
    }

    /// Entry starting exactly at `offset`.
    pub fn entry_at_offset(&self, offset: u64) -> Option<usize> {
        self.by_offset
            .binary_search_by_key(&offset, |&(off, _)| off)
            .ok()
            .map(|pos| self.by_offset[pos].1 as usize)
    }

    /// All ids, in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.count).map(move |i| self.id_at(i))
    }

    /// Checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - TRAILER_LEN;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.data[start..start + 20]);
        ObjectId::from_hash(hash)
    }

    fn hash_bytes(&self, i: usize) -> &[u8] {
        let start = Layout::new(self.count).hashes + i * 20;
        &self.data[start..start + 20]
    }
}

/// Byte positions of the per-entry tables.
struct Layout {
    hashes: usize,
    crcs: usize,
    offsets: usize,
    large_offsets: usize,
}

impl Layout {
    fn new(count: usize) -> Self {
        let hashes = HEADER_LEN + FAN_OUT_LEN;
        let crcs = hashes + count * 20;
        let offsets = crcs + count * 4;
        let large_offsets = offsets + count * 4;
        Self {
            hashes,
            crcs,
            offsets,
            large_offsets,
        }
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[pos..pos + 4]);
    u32::from_be_bytes(buf)
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::encode_index;

    fn id(first: u8, rest: u8) -> ObjectId {
        let mut hash = [rest; 20];
        hash[0] = first;
        ObjectId::from_hash(hash)
    }

    #[test]
    fn lengths_follow_sorted_offset_gaps() {
        let a = id(0x10, 1);
        let b = id(0x20, 2);
        let c = id(0x30, 3);
        let data = encode_index(&[(a, 0, 40), (b, 0, 12), (c, 0, 76)], false);
        let idx = PackIndex::parse(data, 120).unwrap();

        assert_eq!(idx.len(), 3);
        let ia = idx.lookup(&a).unwrap();
        let ib = idx.lookup(&b).unwrap();
        let ic = idx.lookup(&c).unwrap();
        assert_eq!(idx.offset_at(ia), 40);
        assert_eq!(idx.length_at(ib), 28); // 12 -> 40
        assert_eq!(idx.length_at(ia), 36); // 40 -> 76
        assert_eq!(idx.length_at(ic), 24); // 120 - 76 - 20
    }

    #[test]
    fn lookup_uses_fan_out_buckets() {
        let ids = [id(0x00, 1), id(0x00, 2), id(0x7f, 0), id(0xff, 9)];
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32, 12 + 10 * i as u64))
            .collect();
        let idx = PackIndex::parse(encode_index(&entries, false), 200).unwrap();

        for (i, id) in ids.iter().enumerate() {
            let pos = idx.lookup(id).unwrap();
            assert_eq!(idx.id_at(pos), *id);
            assert_eq!(idx.crc32_at(pos), i as u32);
        }
        assert!(idx.lookup(&id(0x00, 3)).is_none());
        assert!(idx.lookup(&id(0x80, 0)).is_none());
        assert_eq!(idx.fan_out()[0], 2);
        assert_eq!(idx.fan_out()[0x7f], 3);
        assert_eq!(idx.fan_out()[0xfe], 3);
        assert_eq!(idx.fan_out()[0xff], 4);
    }

    #[test]
    fn ids_are_sorted() {
        let entries = [(id(0x30, 0), 0, 12), (id(0x10, 0), 0, 30), (id(0x20, 0), 0, 50)];
        let idx = PackIndex::parse(encode_index(&entries, false), 100).unwrap();
        let ids: Vec<_> = idx.ids().collect();
        assert_eq!(ids, [id(0x10, 0), id(0x20, 0), id(0x30, 0)]);
    }

    #[test]
    fn large_offsets_are_followed() {
        let big = (1u64 << 33) + 12;
        let entries = [(id(0x01, 0), 0, 12), (id(0x02, 0), 0, big)];
        let idx = PackIndex::parse(encode_index(&entries, true), big + 100).unwrap();
        assert_eq!(idx.offset_at(idx.lookup(&id(0x02, 0)).unwrap()), big);
        assert_eq!(idx.length_at(idx.lookup(&id(0x01, 0)).unwrap()), big - 12);
        assert_eq!(idx.entry_at_offset(big), idx.lookup(&id(0x02, 0)));
    }

    #[test]
    fn large_offset_slot_out_of_range() {
        let mut data = encode_index(&[(id(0x01, 0), 0, 12)], false);
        let offset_pos = HEADER_LEN + FAN_OUT_LEN + 20 + 4;
        data[offset_pos..offset_pos + 4].copy_from_slice(&(LARGE_OFFSET_FLAG | 3).to_be_bytes());
        assert!(PackIndex::parse(data, 100).unwrap_err().is_malformed());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut data = encode_index(&[], false);
        data[0] = b'P';
        assert!(matches!(
            PackIndex::parse(data, 32),
            Err(PackError::UnsupportedVersion { file: "index", .. })
        ));

        let mut data = encode_index(&[], false);
        data[7] = 1;
        assert!(matches!(
            PackIndex::parse(data, 32),
            Err(PackError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_truncated_tables() {
        let data = encode_index(&[(id(1, 1), 0, 12)], false);
        let short = data[..data.len() - 41].to_vec();
        assert!(PackIndex::parse(short, 100).unwrap_err().is_malformed());
    }

    #[test]
    fn rejects_offset_outside_pack() {
        let data = encode_index(&[(id(1, 1), 0, 90)], false);
        assert!(PackIndex::parse(data, 100).unwrap_err().is_malformed());
    }

    #[test]
    fn empty_index() {
        let idx = PackIndex::parse(encode_index(&[], false), 32).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.ids().count(), 0);
        assert!(idx.lookup(&id(0, 0)).is_none());
    }
}
