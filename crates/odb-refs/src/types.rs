//! Ref file contents and the `packed-refs` overlay.

use std::fmt;

use odb_types::ObjectId;

use crate::error::{RefError, Result};

/// What a loose ref file (or `HEAD`) points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTarget {
    /// A 40-hex object id.
    Direct(ObjectId),
    /// `ref: <name>`: another ref.
    Symbolic(String),
}

impl RefTarget {
    /// Parse ref file contents. `name` is only used in error messages.
    pub fn parse(name: &str, contents: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(contents)
            .map_err(|_| RefError::malformed(name, "contents are not UTF-8"))?;
        let text = text.trim();

        if let Some(target) = text.strip_prefix("ref:") {
            let target = target.trim_start();
            if target.is_empty() {
                return Err(RefError::malformed(name, "empty symbolic target"));
            }
            return Ok(Self::Symbolic(target.to_string()));
        }

        let token = text.split_whitespace().next().unwrap_or("");
        ObjectId::from_hex(token)
            .map(Self::Direct)
            .map_err(|_| RefError::malformed(name, format!("expected a 40-hex hash, found {token:?}")))
    }
}

/// Renders the file contents, newline-terminated.
impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(id) => writeln!(f, "{id}"),
            Self::Symbolic(name) => writeln!(f, "ref: {name}"),
        }
    }
}

/// Parsed `packed-refs` file: `(name, id)` pairs in file order.
///
/// Header (`#`) and peeled-tag (`^`) lines are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedRefs {
    entries: Vec<(String, ObjectId)>,
}

impl PackedRefs {
    pub fn parse(contents: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(contents)
            .map_err(|_| RefError::malformed("packed-refs", "contents are not UTF-8"))?;

        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            let (hash, name) = line
                .split_once(' ')
                .ok_or_else(|| RefError::malformed("packed-refs", format!("bad line {line:?}")))?;
            let id = ObjectId::from_hex(hash)
                .map_err(|_| RefError::malformed("packed-refs", format!("bad hash in {line:?}")))?;
            entries.push((name.to_string(), id));
        }
        Ok(Self { entries })
    }

    /// Id recorded for exactly `name`.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
