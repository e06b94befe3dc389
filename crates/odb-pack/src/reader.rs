//! Random-access object loads from a pack, resolving ofs-delta chains.

use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;
use odb_store::{ObjectKind, RawObject};
use odb_types::ObjectId;
use tracing::debug;

use crate::delta::apply_delta;
use crate::entry::{parse_entry_header, parse_ofs_distance, PackObjectType};
use crate::error::{PackError, PackResult};
use crate::index::{PackIndex, PACK_TRAILER_LEN};
use crate::mapped::PackBytes;

const PACK_MAGIC: &[u8; 4] = b"PACK";
const PACK_VERSION: u32 = 2;
const PACK_HEADER_LEN: usize = 12;

/// Random-access reader over one `.pack`/`.idx` pair.
///
/// Both files are mapped read-only for the reader's lifetime. All tables are
/// built in [`PackReader::open`], so a reader is immutable afterwards and
/// may be shared freely between threads.
#[derive(Debug)]
pub struct PackReader {
    pack: PackBytes,
    index: PackIndex,
    verify_crc: bool,
}

impl PackReader {
    /// Map and validate a pack and its index.
    pub fn open(pack_path: &Path, index_path: &Path) -> PackResult<Self> {
        let pack = PackBytes::map(pack_path)?;
        let index = PackBytes::map(index_path)?;
        Self::from_parts(pack, index)
    }

    /// Build a reader over in-memory pack and index bytes.
    pub fn from_bytes(pack: Vec<u8>, index: Vec<u8>) -> PackResult<Self> {
        Self::from_parts(PackBytes::from(pack), PackBytes::from(index))
    }

    fn from_parts(pack: PackBytes, index: PackBytes) -> PackResult<Self> {
        if pack.len() < 8 || &pack[..4] != PACK_MAGIC || read_u32(&pack[4..8]) != PACK_VERSION {
            return Err(PackError::UnsupportedVersion {
                file: "pack",
                header: hex::encode(&pack[..pack.len().min(8)]),
            });
        }
        if pack.len() < PACK_HEADER_LEN + PACK_TRAILER_LEN as usize {
            return Err(PackError::malformed("pack", "file too short"));
        }

        let index = PackIndex::parse(index, pack.len() as u64)?;
        let declared = read_u32(&pack[8..12]) as usize;
        if declared != index.len() {
            return Err(PackError::malformed(
                "pack",
                format!("header counts {declared} objects, index lists {}", index.len()),
            ));
        }
        debug!(objects = index.len(), bytes = pack.len(), "opened pack");
        Ok(Self {
            pack,
            index,
            verify_crc: false,
        })
    }

    /// Check each entry's raw bytes against the index CRC before inflating.
    pub fn with_crc_verification(mut self, enabled: bool) -> Self {
        self.verify_crc = enabled;
        self
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Number of objects in the pack.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Index-only membership test; nothing is inflated.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// All ids in the pack, sorted.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.index.ids()
    }

    /// Load an object by id, resolving delta chains.
    ///
    /// Returns `Ok(None)` if the id is not in this pack.
    pub fn load(&self, id: &ObjectId) -> PackResult<Option<RawObject>> {
        match self.index.lookup(id) {
            Some(entry) => self.load_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve entry `entry` to a whole object.
    ///
    /// Walks base links until a non-delta entry, then applies the collected
    /// deltas innermost first. Base offsets strictly decrease along the
    /// chain, so the walk always terminates.
    fn load_entry(&self, entry: usize) -> PackResult<RawObject> {
        let mut deltas = Vec::new();
        let mut current = entry;
        let (kind, mut body) = loop {
            match self.read_entry(current)? {
                Entry::Whole { kind, data } => break (kind, data),
                Entry::OfsDelta { base_offset, data } => {
                    deltas.push(data);
                    current = self.index.entry_at_offset(base_offset).ok_or_else(|| {
                        PackError::malformed(
                            "ofs-delta",
                            format!("no entry starts at base offset {base_offset}"),
                        )
                    })?;
                }
            }
        };

        if !deltas.is_empty() {
            debug!(depth = deltas.len(), %kind, "resolving delta chain");
        }
        while let Some(delta) = deltas.pop() {
            body = apply_delta(&body, &delta)?;
        }
        Ok(RawObject::new(kind, body))
    }

    fn read_entry(&self, entry: usize) -> PackResult<Entry> {
        let offset = self.index.offset_at(entry);
        let length = self.index.length_at(entry);
        let start = offset as usize;
        let raw = self
            .pack
            .get(start..start + length as usize)
            .ok_or_else(|| PackError::malformed("pack entry", format!("offset {offset} out of range")))?;

        if self.verify_crc {
            let expected = self.index.crc32_at(entry);
            let actual = crc32fast::hash(raw);
            if actual != expected {
                return Err(PackError::malformed(
                    "pack entry",
                    format!("CRC32 mismatch at offset {offset}: index {expected:08x}, data {actual:08x}"),
                ));
            }
        }

        let header = parse_entry_header(raw)?;
        let mut pos = header.header_len;
        let base_offset = match header.kind {
            PackObjectType::OfsDelta => {
                let (distance, used) = parse_ofs_distance(&raw[pos..])?;
                pos += used;
                if distance == 0 || distance > offset {
                    return Err(PackError::malformed(
                        "ofs-delta",
                        format!("base distance {distance} invalid at offset {offset}"),
                    ));
                }
                Some(offset - distance)
            }
            PackObjectType::RefDelta => {
                let base = raw
                    .get(pos..pos + ObjectId::LEN)
                    .map(hex::encode)
                    .unwrap_or_default();
                return Err(PackError::Unsupported(format!(
                    "ref-delta entry at offset {offset} (base {base})"
                )));
            }
            _ => None,
        };

        let data = inflate(&raw[pos..], header.size, offset)?;
        match (header.kind.object_kind(), base_offset) {
            (Some(kind), _) => Ok(Entry::Whole { kind, data }),
            (None, Some(base_offset)) => Ok(Entry::OfsDelta { base_offset, data }),
            (None, None) => Err(PackError::Unsupported(format!(
                "entry type {:?} at offset {offset}",
                header.kind
            ))),
        }
    }
}

enum Entry {
    Whole { kind: ObjectKind, data: Vec<u8> },
    OfsDelta { base_offset: u64, data: Vec<u8> },
}

fn inflate(compressed: &[u8], size: u64, offset: u64) -> PackResult<Vec<u8>> {
    let mut out = Vec::with_capacity(size.min(1 << 24) as usize);
    ZlibDecoder::new(compressed)
        .take(size.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|source| PackError::Decompression { offset, source })?;
    if out.len() as u64 != size {
        return Err(PackError::malformed(
            "pack entry",
            format!("inflated {} bytes at offset {offset}, header declares {size}", out.len()),
        ));
    }
    Ok(out)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{append_delta, deflate, encode_entry_header, PackBuilder};

    fn reader(builder: PackBuilder) -> PackReader {
        let (pack, index) = builder.finish();
        PackReader::from_bytes(pack, index).unwrap()
    }

    #[test]
    fn loads_whole_objects_of_every_kind() {
        let mut b = PackBuilder::new();
        let (blob, _) = b.add_object(ObjectKind::Blob, b"hello world\n");
        let (tree, _) = b.add_object(ObjectKind::Tree, b"");
        let (commit, _) = b.add_object(ObjectKind::Commit, b"tree x\n\nmsg");
        let (tag, _) = b.add_object(ObjectKind::Tag, b"object y\n");
        let r = reader(b);

        assert_eq!(r.len(), 4);
        let obj = r.load(&blob).unwrap().unwrap();
        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(obj.body, b"hello world\n");
        assert_eq!(obj.compute_id(), blob);
        assert_eq!(r.load(&tree).unwrap().unwrap().kind, ObjectKind::Tree);
        assert_eq!(r.load(&commit).unwrap().unwrap().kind, ObjectKind::Commit);
        assert_eq!(r.load(&tag).unwrap().unwrap().kind, ObjectKind::Tag);
    }

    #[test]
    fn missing_id_is_none() {
        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"x");
        let r = reader(b);
        assert!(r.load(&ObjectId::null()).unwrap().is_none());
        assert!(!r.contains(&ObjectId::null()));
    }

    #[test]
    fn resolves_ofs_delta_chain() {
        let mut b = PackBuilder::new();
        let v1 = b"line one\n".to_vec();
        let v2 = [v1.clone(), b"line two\n".to_vec()].concat();
        let v3 = [v2.clone(), b"line three\n".to_vec()].concat();

        let (_, base_off) = b.add_object(ObjectKind::Blob, &v1);
        let (id2, off2) = b.add_ofs_delta(base_off, ObjectKind::Blob, &v2, &append_delta(v1.len(), b"line two\n"));
        let (id3, _) = b.add_ofs_delta(off2, ObjectKind::Blob, &v3, &append_delta(v2.len(), b"line three\n"));
        let r = reader(b);

        let obj = r.load(&id3).unwrap().unwrap();
        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(obj.body, v3);
        assert_eq!(obj.compute_id(), id3);
        assert_eq!(r.load(&id2).unwrap().unwrap().body, v2);
    }

    #[test]
    fn delta_inherits_base_kind() {
        let mut b = PackBuilder::new();
        let base = b"tree aaaa\n\nfirst";
        let target = b"tree aaaa\n\nfirst!";
        let (_, off) = b.add_object(ObjectKind::Commit, base);
        let (id, _) = b.add_ofs_delta(off, ObjectKind::Commit, target, &append_delta(base.len(), b"!"));
        let r = reader(b);
        assert_eq!(r.load(&id).unwrap().unwrap().kind, ObjectKind::Commit);
    }

    #[test]
    fn ref_delta_is_unsupported() {
        let mut b = PackBuilder::new();
        let (base, _) = b.add_object(ObjectKind::Blob, b"base");
        let target = ObjectId::from_hash([0x42; 20]);
        b.add_ref_delta(target, base, &append_delta(4, b"!"));
        let r = reader(b);
        assert!(matches!(r.load(&target), Err(PackError::Unsupported(_))));
    }

    #[test]
    fn size_mismatch_is_malformed() {
        let mut b = PackBuilder::new();
        let id = ObjectId::from_hash([0x11; 20]);
        let mut raw = encode_entry_header(PackObjectType::Blob, 10);
        raw.extend_from_slice(&deflate(b"short"));
        b.push_raw(id, &raw);
        let r = reader(b);
        assert!(r.load(&id).unwrap_err().is_malformed());
    }

    #[test]
    fn corrupt_zlib_is_decompression_error() {
        let mut b = PackBuilder::new();
        let id = ObjectId::from_hash([0x22; 20]);
        let mut raw = encode_entry_header(PackObjectType::Blob, 5);
        raw.extend_from_slice(b"\x78\x9cnot zlib at all");
        b.push_raw(id, &raw);
        let r = reader(b);
        assert!(matches!(r.load(&id), Err(PackError::Decompression { .. })));
    }

    #[test]
    fn crc_verification_catches_corruption() {
        let mut b = PackBuilder::new();
        let (id, off) = b.add_object(ObjectKind::Blob, b"payload");
        let (mut pack, index) = b.finish();
        // Flip a bit in the entry header's size; CRC no longer matches.
        pack[off as usize] ^= 0x01;

        let unchecked = PackReader::from_bytes(pack.clone(), index.clone()).unwrap();
        assert!(unchecked.load(&id).unwrap_err().is_malformed());

        let checked = PackReader::from_bytes(pack, index)
            .unwrap()
            .with_crc_verification(true);
        let err = checked.load(&id).unwrap_err();
        assert!(err.to_string().contains("CRC32"));
    }

    #[test]
    fn crc_verification_passes_clean_pack() {
        let mut b = PackBuilder::new();
        let (id, _) = b.add_object(ObjectKind::Blob, b"payload");
        let (pack, index) = b.finish();
        let r = PackReader::from_bytes(pack, index)
            .unwrap()
            .with_crc_verification(true);
        assert_eq!(r.load(&id).unwrap().unwrap().body, b"payload");
    }

    #[test]
    fn rejects_bad_pack_header() {
        let (mut pack, index) = PackBuilder::new().finish();
        pack[0..4].copy_from_slice(b"KCAP");
        assert!(matches!(
            PackReader::from_bytes(pack, index.clone()),
            Err(PackError::UnsupportedVersion { file: "pack", .. })
        ));

        let (mut pack, _) = PackBuilder::new().finish();
        pack[4..8].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(
            PackReader::from_bytes(pack, index),
            Err(PackError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut b = PackBuilder::new();
        b.add_object(ObjectKind::Blob, b"one");
        let (mut pack, index) = b.finish();
        pack[8..12].copy_from_slice(&7u32.to_be_bytes());
        assert!(PackReader::from_bytes(pack, index).unwrap_err().is_malformed());
    }

    #[test]
    fn opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = PackBuilder::new();
        let (id, _) = b.add_object(ObjectKind::Blob, b"on disk");
        let name = b.write_to(dir.path());

        let r = PackReader::open(
            &dir.path().join(format!("pack-{name}.pack")),
            &dir.path().join(format!("pack-{name}.idx")),
        )
        .unwrap();
        assert_eq!(r.load(&id).unwrap().unwrap().body, b"on disk");
        assert_eq!(r.index().pack_checksum().to_hex(), name);
        assert_eq!(r.ids().collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn empty_pack_opens() {
        let r = reader(PackBuilder::new());
        assert!(r.is_empty());
    }
}
