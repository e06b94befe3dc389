use std::borrow::Cow;
use std::collections::HashSet;
use std::str::FromStr;

use odb_crypto::ContentHasher;
use odb_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Opaque file contents.
    Blob,
    /// Directory listing: entries mapping names to object references.
    Tree,
    /// Snapshot pointer with ancestry and authorship.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    /// The frame header tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// The kind-tagged hasher for bodies of this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Tree => &ContentHasher::TREE,
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tag => &ContentHasher::TAG,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(StoreError::malformed(
                "object kind",
                format!("unknown kind {other:?}"),
            )),
        }
    }
}

/// A deframed object: kind tag plus the still-encoded body bytes.
///
/// `RawObject` is what the content store and the pack reader hand back. It
/// is decoded into a typed [`Object`] on demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The encoded body, without the frame header.
    pub body: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectKind, body: Vec<u8>) -> Self {
        Self { kind, body }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.body)
    }

    /// The framed bytes `"<kind> <len>\0<body>"`.
    pub fn to_framed(&self) -> Vec<u8> {
        codec::frame(self.kind, &self.body)
    }

    /// Decode the body into a typed object.
    pub fn decode(&self) -> StoreResult<Object> {
        codec::decode(self.kind, &self.body)
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for Blob {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

impl From<&str> for Blob {
    fn from(text: &str) -> Self {
        Self {
            data: text.as_bytes().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
    /// Submodule commit (0o160000).
    Gitlink,
    /// Any other mode found on disk, kept verbatim.
    Other(u32),
}

impl EntryMode {
    /// Octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
            Self::Gitlink => 0o160000,
            Self::Other(bits) => *bits,
        }
    }

    /// Map an octal mode value to its variant.
    pub fn from_mode_bits(bits: u32) -> Self {
        match bits {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o040000 => Self::Directory,
            0o160000 => Self::Gitlink,
            other => Self::Other(other),
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// The kind of object an entry with this mode points at.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::Directory => ObjectKind::Tree,
            Self::Gitlink => ObjectKind::Commit,
            _ => ObjectKind::Blob,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode (regular, executable, symlink, directory, ...).
    pub mode: EntryMode,
    /// Entry name (filename or directory name).
    pub name: String,
    /// Content address of the referenced object.
    pub hash: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, hash: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            hash,
        }
    }

    /// Sort key: directories compare as if their name ended in `/`.
    pub fn sort_key(&self) -> Cow<'_, [u8]> {
        if self.mode.is_tree() {
            let mut key = Vec::with_capacity(self.name.len() + 1);
            key.extend_from_slice(self.name.as_bytes());
            key.push(b'/');
            Cow::Owned(key)
        } else {
            Cow::Borrowed(self.name.as_bytes())
        }
    }
}

/// Directory listing object.
///
/// Entry names are unique. Entries built through [`Tree::new`] are kept in
/// encode order (see [`codec::tree_sort`]); decoded trees keep their on-disk
/// order. Equality ignores order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TreeFields")]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

/// Deserialized form of [`Tree`], checked by `Tree::new`.
#[derive(Deserialize)]
struct TreeFields {
    entries: Vec<TreeEntry>,
}

impl TryFrom<TreeFields> for Tree {
    type Error = StoreError;

    fn try_from(fields: TreeFields) -> StoreResult<Self> {
        Tree::new(fields.entries)
    }
}

impl Tree {
    /// Create a tree from entries, rejecting duplicate names.
    pub fn new(mut entries: Vec<TreeEntry>) -> StoreResult<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(StoreError::DuplicateEntry(entry.name.clone()));
            }
        }
        entries.sort_by(codec::tree_sort);
        Ok(Self { entries })
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Entries in their stored order.
    pub(crate) fn from_decoded(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sorted_refs(&self) -> Vec<&TreeEntry> {
        let mut refs: Vec<&TreeEntry> = self.entries.iter().collect();
        refs.sort_by(|a, b| codec::tree_sort(a, b));
        refs
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.sorted_refs() == other.sorted_refs()
    }
}

impl Eq for Tree {}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// A timestamp with the author's UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDate {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Minutes to add to local time to reach UTC: `-330` renders as `+0530`.
    pub offset_minutes: i32,
}

impl PersonDate {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }
}

/// Author, committer, or tagger identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    pub date: PersonDate,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>, date: PersonDate) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date,
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&codec::format_person(self))
    }
}

// ---------------------------------------------------------------------------
// Commit / Tag
// ---------------------------------------------------------------------------

/// Commit object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    /// Parent commits in recorded order; merge parent order is significant.
    pub parents: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    /// Headers other than tree/parent/author/committer (`gpgsig`,
    /// `encoding`, ...), in on-disk order. Multi-line values use `\n`.
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
    pub message: String,
}

/// Annotated tag object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// The tagged object.
    pub object: ObjectId,
    /// Kind name of the tagged object, as written in the `type` header.
    pub object_type: String,
    /// Tag name.
    pub tag: String,
    pub tagger: Person,
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A typed object body, one variant per kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Encode the body and pair it with its kind.
    pub fn to_raw(&self) -> RawObject {
        RawObject::new(self.kind(), codec::encode(self))
    }

    /// Content address of this object.
    pub fn compute_id(&self) -> ObjectId {
        self.to_raw().compute_id()
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Self::Tree(tree)
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Self::Commit(commit)
    }
}

impl From<Tag> for Object {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}
