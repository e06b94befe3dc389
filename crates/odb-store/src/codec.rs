//! Canonical byte encoding of object bodies and the `"<kind> <len>\0"` frame.
//!
//! `encode` is total over [`Object`]; `decode` rejects any body that does not
//! follow the per-kind layout. `decode(kind, encode(obj)) == obj` holds for
//! every object whose text fields survive [`safe`] unchanged.

use std::cmp::Ordering;

use odb_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{
    Blob, Commit, EntryMode, Object, ObjectKind, Person, PersonDate, RawObject, Tag, Tree,
    TreeEntry,
};

/// Characters trimmed from both ends of each line of a person field.
const EDGE_CHARS: &[char] = &['.', ',', ':', ';', '<', '>', '"', '\''];

/// Characters removed anywhere in a person field.
const STRIP_CHARS: &[char] = &['\0', '<', '>'];

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Prefix `body` with `"<kind> <len>\0"`.
pub fn frame(kind: ObjectKind, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind, body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Encode and frame a typed object.
pub fn frame_object(object: &Object) -> Vec<u8> {
    frame(object.kind(), &encode(object))
}

/// Split framed bytes into kind and body, checking the declared length.
pub fn deframe(bytes: &[u8]) -> StoreResult<RawObject> {
    let space = bytes
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| StoreError::malformed("frame", "missing space after kind"))?;
    let nul = bytes[space + 1..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| p + space + 1)
        .ok_or_else(|| StoreError::malformed("frame", "missing NUL after length"))?;

    let kind = std::str::from_utf8(&bytes[..space])
        .map_err(|_| StoreError::malformed("frame", "kind is not ASCII"))?
        .parse::<ObjectKind>()?;
    let declared = parse_decimal(&bytes[space + 1..nul])
        .ok_or_else(|| StoreError::malformed("frame", "length is not a decimal number"))?;

    let body = &bytes[nul + 1..];
    if declared != body.len() as u64 {
        return Err(StoreError::malformed(
            "frame",
            format!("declared length {declared}, found {}", body.len()),
        ));
    }
    Ok(RawObject::new(kind, body.to_vec()))
}

fn parse_decimal(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Canonical body bytes for an object.
pub fn encode(object: &Object) -> Vec<u8> {
    match object {
        Object::Blob(blob) => blob.data.clone(),
        Object::Tree(tree) => encode_tree(tree),
        Object::Commit(commit) => encode_commit(commit).into_bytes(),
        Object::Tag(tag) => encode_tag(tag).into_bytes(),
    }
}

/// Directory-aware entry order: a directory sorts as if its name ended in `/`.
pub fn tree_sort(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

fn encode_tree(tree: &Tree) -> Vec<u8> {
    let mut entries: Vec<&TreeEntry> = tree.entries().iter().collect();
    entries.sort_by(|a, b| tree_sort(a, b));

    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(format!("{:o} ", entry.mode.mode_bits()).as_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.hash.as_bytes());
    }
    out
}

fn encode_commit(commit: &Commit) -> String {
    let mut out = format!("tree {}\n", commit.tree);
    for parent in &commit.parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str(&format!("author {}\n", format_person(&commit.author)));
    out.push_str(&format!("committer {}\n", format_person(&commit.committer)));
    push_extra_headers(&mut out, &commit.extra_headers);
    out.push('\n');
    out.push_str(&commit.message);
    out
}

fn encode_tag(tag: &Tag) -> String {
    let mut out = format!(
        "object {}\ntype {}\ntag {}\ntagger {}\n",
        tag.object,
        tag.object_type,
        tag.tag,
        format_person(&tag.tagger)
    );
    push_extra_headers(&mut out, &tag.extra_headers);
    out.push('\n');
    out.push_str(&tag.message);
    out
}

fn push_extra_headers(out: &mut String, headers: &[(String, String)]) {
    for (key, value) in headers {
        out.push_str(key);
        out.push(' ');
        // Continuation lines start with a single space.
        out.push_str(&value.replace('\n', "\n "));
        out.push('\n');
    }
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// Remove characters that would break the `name <email>` layout.
///
/// Per line: trim leading and trailing runs of `.,:;<>"'`, then drop any NUL,
/// `<` or `>`. Line feeds are dropped, joining the lines.
pub fn safe(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            line.trim_start_matches(EDGE_CHARS)
                .trim_end_matches(EDGE_CHARS)
                .replace(STRIP_CHARS, "")
        })
        .collect()
}

/// Render `name <email> seconds ±HHMM`.
pub fn format_person(person: &Person) -> String {
    let offset = person.date.offset_minutes;
    let (sign, magnitude) = if offset <= 0 {
        ('+', offset.unsigned_abs())
    } else {
        ('-', offset.unsigned_abs())
    };
    format!(
        "{} <{}> {} {}{:02}{:02}",
        safe(&person.name),
        safe(&person.email),
        person.date.seconds,
        sign,
        magnitude / 60,
        magnitude % 60
    )
}

/// Parse `name <email> seconds ±HHMM`.
///
/// The name may not contain `<` and the email may not contain `>`. The
/// offset token decodes to the exact inverse of [`format_person`].
pub fn parse_person(text: &str) -> StoreResult<Person> {
    let bad = |reason: &str| StoreError::malformed("person", format!("{reason}: {text:?}"));

    let lt = text.find('<').ok_or_else(|| bad("missing '<'"))?;
    let name = text[..lt]
        .strip_suffix(' ')
        .ok_or_else(|| bad("missing space before '<'"))?;
    let rest = &text[lt + 1..];
    let gt = rest.find('>').ok_or_else(|| bad("missing '>'"))?;
    let email = &rest[..gt];
    let rest = rest[gt + 1..]
        .strip_prefix(' ')
        .ok_or_else(|| bad("missing space after '>'"))?;
    let (seconds, offset) = rest
        .split_once(' ')
        .ok_or_else(|| bad("missing timezone"))?;

    let seconds: i64 = seconds.parse().map_err(|_| bad("invalid timestamp"))?;
    let offset_minutes = parse_offset(offset).ok_or_else(|| bad("invalid timezone"))?;

    Ok(Person {
        name: name.to_string(),
        email: email.to_string(),
        date: PersonDate::new(seconds, offset_minutes),
    })
}

fn parse_offset(token: &str) -> Option<i32> {
    let (sign, digits) = match token.as_bytes().first()? {
        b'+' => (1, &token[1..]),
        b'-' => (-1, &token[1..]),
        _ => (1, token),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i32 = digits.parse().ok()?;
    let minutes = (value / 100) * 60 + value % 100;
    Some(-sign * minutes)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a body of the given kind.
pub fn decode(kind: ObjectKind, body: &[u8]) -> StoreResult<Object> {
    match kind {
        ObjectKind::Blob => Ok(Object::Blob(Blob::new(body.to_vec()))),
        ObjectKind::Tree => decode_tree(body).map(Object::Tree),
        ObjectKind::Commit => decode_commit(body).map(Object::Commit),
        ObjectKind::Tag => decode_tag(body).map(Object::Tag),
    }
}

/// Deframe and decode in one step.
pub fn decode_framed(bytes: &[u8]) -> StoreResult<Object> {
    deframe(bytes)?.decode()
}

fn decode_tree(body: &[u8]) -> StoreResult<Tree> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let space = body[i..]
            .iter()
            .position(|&b| b == b' ')
            .map(|p| p + i)
            .ok_or_else(|| StoreError::malformed("tree", "missing space after mode"))?;
        let nul = body[space + 1..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| p + space + 1)
            .ok_or_else(|| StoreError::malformed("tree", "missing NUL after name"))?;

        let mode = std::str::from_utf8(&body[i..space])
            .ok()
            .filter(|m| !m.is_empty())
            .and_then(|m| u32::from_str_radix(m, 8).ok())
            .ok_or_else(|| StoreError::malformed("tree", "mode is not octal"))?;
        let name = std::str::from_utf8(&body[space + 1..nul])
            .map_err(|_| StoreError::malformed("tree", "entry name is not UTF-8"))?;

        let hash_end = nul + 1 + ObjectId::LEN;
        if hash_end > body.len() {
            return Err(StoreError::malformed("tree", "truncated entry hash"));
        }
        let hash = ObjectId::from_slice(&body[nul + 1..hash_end])
            .map_err(|e| StoreError::malformed("tree", e.to_string()))?;

        entries.push(TreeEntry::new(EntryMode::from_mode_bits(mode), name, hash));
        i = hash_end;
    }
    Ok(Tree::from_decoded(entries))
}

/// Header lines and message of a commit or tag body.
struct Headers {
    fields: Vec<(String, String)>,
    message: String,
}

fn split_headers(what: &'static str, body: &[u8]) -> StoreResult<Headers> {
    let text =
        std::str::from_utf8(body).map_err(|_| StoreError::malformed(what, "body is not UTF-8"))?;

    let mut fields: Vec<(String, String)> = Vec::new();
    let mut rest = text;
    loop {
        let newline = rest
            .find('\n')
            .ok_or_else(|| StoreError::malformed(what, "header section is not terminated"))?;
        let line = &rest[..newline];
        rest = &rest[newline + 1..];

        if line.is_empty() {
            break;
        }
        if let Some(continued) = line.strip_prefix(' ') {
            let (_, value) = fields
                .last_mut()
                .ok_or_else(|| StoreError::malformed(what, "continuation before any header"))?;
            value.push('\n');
            value.push_str(continued);
            continue;
        }
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| StoreError::malformed(what, format!("header without value: {line:?}")))?;
        fields.push((key.to_string(), value.to_string()));
    }

    Ok(Headers {
        fields,
        message: rest.to_string(),
    })
}

fn parse_id(what: &'static str, hex: &str) -> StoreResult<ObjectId> {
    ObjectId::from_hex(hex).map_err(|e| StoreError::malformed(what, e.to_string()))
}

fn decode_commit(body: &[u8]) -> StoreResult<Commit> {
    let headers = split_headers("commit", body)?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut extra_headers = Vec::new();
    for (key, value) in headers.fields {
        match key.as_str() {
            "tree" => tree = Some(parse_id("commit", &value)?),
            "parent" => parents.push(parse_id("commit", &value)?),
            "author" => author = Some(parse_person(&value)?),
            "committer" => committer = Some(parse_person(&value)?),
            _ => extra_headers.push((key, value)),
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| StoreError::malformed("commit", "missing tree"))?,
        parents,
        author: author.ok_or_else(|| StoreError::malformed("commit", "missing author"))?,
        committer: committer
            .ok_or_else(|| StoreError::malformed("commit", "missing committer"))?,
        extra_headers,
        message: headers.message,
    })
}

fn decode_tag(body: &[u8]) -> StoreResult<Tag> {
    let headers = split_headers("tag", body)?;

    let mut object = None;
    let mut object_type = None;
    let mut name = None;
    let mut tagger = None;
    let mut extra_headers = Vec::new();
    for (key, value) in headers.fields {
        match key.as_str() {
            "object" => object = Some(parse_id("tag", &value)?),
            "type" => object_type = Some(value),
            "tag" => name = Some(value),
            "tagger" => tagger = Some(parse_person(&value)?),
            _ => extra_headers.push((key, value)),
        }
    }

    Ok(Tag {
        object: object.ok_or_else(|| StoreError::malformed("tag", "missing object"))?,
        object_type: object_type.ok_or_else(|| StoreError::malformed("tag", "missing type"))?,
        tag: name.ok_or_else(|| StoreError::malformed("tag", "missing tag name"))?,
        tagger: tagger.ok_or_else(|| StoreError::malformed("tag", "missing tagger"))?,
        extra_headers,
        message: headers.message,
    })
}
