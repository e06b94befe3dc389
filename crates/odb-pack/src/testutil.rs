//! Hand-built version-2 packs and indexes for tests.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use odb_crypto::Sha1;
use odb_store::{ObjectKind, RawObject};
use odb_types::ObjectId;

use crate::entry::PackObjectType;
use crate::index::{INDEX_MAGIC, INDEX_VERSION};

/// Encode an index for `(id, crc, offset)` entries. With `force_large`, every
/// offset goes through the large-offset table.
pub fn encode_index(entries: &[(ObjectId, u32, u64)], force_large: bool) -> Vec<u8> {
    encode_index_with_checksum(entries, force_large, [0u8; 20])
}

fn encode_index_with_checksum(
    entries: &[(ObjectId, u32, u64)],
    force_large: bool,
    pack_checksum: [u8; 20],
) -> Vec<u8> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    out.extend_from_slice(&INDEX_MAGIC);
    out.extend_from_slice(&INDEX_VERSION.to_be_bytes());

    let mut fan_out = [0u32; 256];
    for (id, _, _) in &sorted {
        for slot in &mut fan_out[id.first_byte() as usize..] {
            *slot += 1;
        }
    }
    for count in fan_out {
        out.extend_from_slice(&count.to_be_bytes());
    }
    for (id, _, _) in &sorted {
        out.extend_from_slice(id.as_bytes());
    }
    for (_, crc, _) in &sorted {
        out.extend_from_slice(&crc.to_be_bytes());
    }
    let mut large = Vec::new();
    for (_, _, offset) in &sorted {
        if force_large || *offset >= 0x8000_0000 {
            let slot = (large.len() as u32) | 0x8000_0000;
            out.extend_from_slice(&slot.to_be_bytes());
            large.push(*offset);
        } else {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in large {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out.extend_from_slice(&pack_checksum);
    let mut sha = Sha1::new();
    sha.update(&out);
    out.extend_from_slice(&sha.finalize());
    out
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Builds a pack byte by byte, tracking offsets and CRCs for the index.
pub struct PackBuilder {
    pack: Vec<u8>,
    entries: Vec<(ObjectId, u32, u64)>,
}

impl PackBuilder {
    pub fn new() -> Self {
        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&0u32.to_be_bytes());
        Self {
            pack,
            entries: Vec::new(),
        }
    }

    /// Add a whole object. Returns its id and offset.
    pub fn add_object(&mut self, kind: ObjectKind, body: &[u8]) -> (ObjectId, u64) {
        let id = RawObject::new(kind, body.to_vec()).compute_id();
        let code = match kind {
            ObjectKind::Commit => PackObjectType::Commit,
            ObjectKind::Tree => PackObjectType::Tree,
            ObjectKind::Blob => PackObjectType::Blob,
            ObjectKind::Tag => PackObjectType::Tag,
        };
        let offset = self.push_entry(id, code, &[], body);
        (id, offset)
    }

    /// Add an ofs-delta whose result is `target` of `kind`.
    pub fn add_ofs_delta(
        &mut self,
        base_offset: u64,
        kind: ObjectKind,
        target: &[u8],
        delta: &[u8],
    ) -> (ObjectId, u64) {
        let id = RawObject::new(kind, target.to_vec()).compute_id();
        let offset = self.pack.len() as u64;
        let distance = encode_ofs_distance(offset - base_offset);
        let offset = self.push_entry(id, PackObjectType::OfsDelta, &distance, delta);
        (id, offset)
    }

    /// Add a ref-delta entry listed under `id`.
    pub fn add_ref_delta(&mut self, id: ObjectId, base: ObjectId, delta: &[u8]) -> u64 {
        self.push_entry(id, PackObjectType::RefDelta, base.as_bytes(), delta)
    }

    /// Append raw bytes (for corrupting entries).
    pub fn push_raw(&mut self, id: ObjectId, raw: &[u8]) -> u64 {
        let offset = self.pack.len() as u64;
        self.pack.extend_from_slice(raw);
        self.entries.push((id, crc32fast::hash(raw), offset));
        offset
    }

    fn push_entry(&mut self, id: ObjectId, kind: PackObjectType, extra: &[u8], data: &[u8]) -> u64 {
        let mut raw = encode_entry_header(kind, data.len() as u64);
        raw.extend_from_slice(extra);
        raw.extend_from_slice(&deflate(data));
        self.push_raw(id, &raw)
    }

    /// Finish into `(pack bytes, index bytes)`.
    pub fn finish(mut self) -> (Vec<u8>, Vec<u8>) {
        let count = self.entries.len() as u32;
        self.pack[8..12].copy_from_slice(&count.to_be_bytes());
        let mut sha = Sha1::new();
        sha.update(&self.pack);
        let checksum = sha.finalize();
        self.pack.extend_from_slice(&checksum);
        let index = encode_index_with_checksum(&self.entries, false, checksum);
        (self.pack, index)
    }

    /// Write `pack-<checksum>.pack` and `.idx` into `dir`. Returns the name hash.
    pub fn write_to(self, dir: &Path) -> String {
        let (pack, index) = self.finish();
        let name = hex::encode(&pack[pack.len() - 20..]);
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("pack-{name}.pack")), pack).unwrap();
        std::fs::write(dir.join(format!("pack-{name}.idx")), index).unwrap();
        name
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_entry_header(kind: PackObjectType, size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = (kind.code() << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;
    while rest != 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
    out
}

fn encode_ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance != 0 {
        distance -= 1;
        out.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    out.reverse();
    out
}

/// A delta that copies all of `base` and appends `suffix`.
pub fn append_delta(base_len: usize, suffix: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    write_size(&mut delta, base_len as u64);
    write_size(&mut delta, (base_len + suffix.len()) as u64);
    if base_len > 0 {
        delta.push(0x80 | 0x10 | 0x20 | 0x40);
        delta.push((base_len & 0xff) as u8);
        delta.push(((base_len >> 8) & 0xff) as u8);
        delta.push(((base_len >> 16) & 0xff) as u8);
    }
    for chunk in suffix.chunks(127) {
        delta.push(chunk.len() as u8);
        delta.extend_from_slice(chunk);
    }
    delta
}

fn write_size(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
