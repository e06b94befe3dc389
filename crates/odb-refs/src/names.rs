//! Ref name validation following git-style conventions.
//!
//! Ref names become paths under the repository root, so a name is valid only
//! if:
//! - it is `HEAD` or lives under `refs/`, which keeps `config`, `packed-refs`
//!   and `objects/` out of reach
//! - it is non-empty
//! - it contains no control characters, whitespace, `~`, `^`, `:`, `?`, `*`,
//!   `[` or `\`
//! - it contains no `..` and no `@{`, and is not `@`
//! - it does not start or end with `/`, or end with `.` or `.lock`
//! - every `/`-separated component is non-empty and does not start with `.`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Validate a full ref name such as `refs/heads/master` or `HEAD`.
///
/// # Examples
///
/// ```
/// use odb_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/heads/master").is_ok());
/// assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    let invalid = |reason: String| RefError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("ref name must not be empty".into()));
    }
    if name == "@" {
        return Err(invalid("'@' alone is reserved".into()));
    }
    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(invalid(format!("contains control character {ch:?}")));
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|&&c| name.contains(c)) {
        return Err(invalid(format!("contains forbidden character {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    if name.contains("@{") {
        return Err(invalid("must not contain '@{'".into()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'".into()));
    }
    if name.ends_with('.') {
        return Err(invalid("must not end with '.'".into()));
    }
    if name.ends_with(".lock") {
        return Err(invalid("must not end with '.lock'".into()));
    }
    if name != "HEAD" && !name.starts_with("refs/") {
        return Err(invalid("must be HEAD or start with 'refs/'".into()));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty".into()));
        }
        if component.starts_with('.') {
            return Err(invalid(format!(
                "component must not start with '.': {component:?}"
            )));
        }
    }
    Ok(())
}
