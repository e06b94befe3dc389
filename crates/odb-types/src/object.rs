use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the SHA-1 digest of an object's framed bytes
/// (`"<kind> <len>\0<body>"`). Identical content always produces the same
/// `ObjectId`, which makes objects write-once and verifiable.
///
/// The canonical textual form is 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Length of the raw digest in bytes.
    pub const LEN: usize = 20;

    /// Length of the hex form in characters.
    pub const HEX_LEN: usize = 40;

    /// Create an `ObjectId` from a pre-computed digest.
    pub const fn from_hash(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Create an `ObjectId` from a 20-byte slice, as found in tree entries
    /// and pack indexes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 20] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The null object ID (all zeros).
    pub const fn null() -> Self {
        Self([0u8; 20])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The first byte of the digest; selects the pack index fan-out bucket.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 7 characters).
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }

    /// Loose-object path relative to the repository root:
    /// `objects/<first two hex>/<remaining 38 hex>`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("objects/{}/{}", &hex[..2], &hex[2..])
    }

    /// Parse from a hex string. Only the canonical lowercase form is accepted.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != Self::HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::HEX_LEN,
                actual: s.len(),
            });
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(TypeError::InvalidHex(format!("not lowercase: {s}")));
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Returns `true` if `s` is a canonical 40-character lowercase hex hash.
    pub fn is_hex(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for ObjectId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; 20] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

// Serialized as the 40-hex text form so JSON output matches what users type.
impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EMPTY_BLOB: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 20]);
        assert_eq!(null.to_hex(), "0".repeat(40));
    }

    #[test]
    fn parse_known_hash() {
        let id = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(id.first_byte(), 0xe6);
        assert_eq!(id.to_hex(), EMPTY_BLOB);
        assert_eq!(id.short_hex(), "e69de29");
    }

    #[test]
    fn loose_path_splits_after_two_chars() {
        let id = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(
            id.loose_path(),
            "objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn rejects_wrong_length() {
        let err = ObjectId::from_hex("abc").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 40,
                actual: 3
            }
        );
    }

    #[test]
    fn rejects_uppercase_and_garbage() {
        assert!(ObjectId::from_hex(&EMPTY_BLOB.to_uppercase()).is_err());
        assert!(ObjectId::from_hex(&"z".repeat(40)).is_err());
    }

    #[test]
    fn is_hex_matches_canonical_form_only() {
        assert!(ObjectId::is_hex(EMPTY_BLOB));
        assert!(!ObjectId::is_hex("refs/heads/master"));
        assert!(!ObjectId::is_hex(&EMPTY_BLOB.to_uppercase()));
        assert!(!ObjectId::is_hex(&EMPTY_BLOB[..39]));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(ObjectId::from_slice(&[1u8; 20]).is_ok());
        assert!(ObjectId::from_slice(&[1u8; 19]).is_err());
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjectId::from_hash([0xab; 20]);
        assert_eq!(format!("{id}"), "ab".repeat(20));
        assert_eq!(format!("{id:?}"), "ObjectId(abababa)");
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{EMPTY_BLOB}\""));
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn ordering_follows_bytes() {
        let id1 = ObjectId::from_hash([0; 20]);
        let id2 = ObjectId::from_hash([1; 20]);
        assert!(id1 < id2);
    }

    proptest! {
        #[test]
        fn hex_text_form_roundtrips(bytes in proptest::array::uniform20(any::<u8>())) {
            let id = ObjectId::from_hash(bytes);
            let hex = id.to_hex();
            prop_assert!(ObjectId::is_hex(&hex));
            prop_assert_eq!(hex.parse::<ObjectId>().unwrap(), id);
        }
    }
}
