//! Request validation performed before the edit workflow runs.
//!
//! Note paths become both working-tree paths and branch names, so they are
//! held to the stricter of the two rule sets:
//!
//! | Check | Error |
//! |-------|-------|
//! | empty / over `max_path_len` | `Empty` / `TooLong` |
//! | leading `/` or drive prefix | `AbsolutePath` |
//! | `.` or `..` segment | `Traversal` |
//! | `//` or trailing `/` | `DoubledSeparator` |
//! | control or shell-special character | `ControlCharacter` / `ForbiddenCharacter` |
//! | reserved file name in any segment | `ReservedName` |
//! | starts with the deletion branch marker | `ReservedPrefix` |
//! | derived isolation branch is not a valid ref | `InvalidBranchName` |

use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use crate::config::LimitsConfig;
use crate::errors::ValidationError;
use crate::models::{IsolationKind, RESERVED_NOTE_PREFIX};

/// Characters rejected anywhere in a note path.
const FORBIDDEN_PATH_CHARS: &[char] = &[
    '\\', ';', '&', '|', '$', '`', '<', '>', '*', '?', '"', '\'', ':', '~', '^', '[', ']', '{',
    '}', '#', '%', '!',
];

/// Segment names that must never be read or written as notes.
const RESERVED_NAMES: &[&str] = &[
    ".git",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
    ".gitkeep",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
];

/// Windows device names, reserved with or without an extension.
const DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn version_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").expect("static regex"))
}

/// Validate a note path against the configured limits.
pub fn validate_note_path(path: &str, limits: &LimitsConfig) -> Result<(), ValidationError> {
    const FIELD: &str = "note_path";

    if path.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if path.len() > limits.max_path_len {
        return Err(ValidationError::TooLong {
            field: FIELD,
            limit: limits.max_path_len,
        });
    }
    if path.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter(FIELD));
    }
    if let Some(ch) = path.chars().find(|c| FORBIDDEN_PATH_CHARS.contains(c)) {
        // A drive prefix such as `C:` reads better as an absolute path.
        if ch == ':' || ch == '\\' {
            if is_drive_prefixed(path) {
                return Err(ValidationError::AbsolutePath(path.to_string()));
            }
            if path.split('\\').any(|seg| seg == "..") {
                return Err(ValidationError::Traversal(path.to_string()));
            }
        }
        return Err(ValidationError::ForbiddenCharacter { field: FIELD, ch });
    }
    if path.starts_with('/') {
        return Err(ValidationError::AbsolutePath(path.to_string()));
    }

    for segment in path.split('/') {
        match segment {
            "" => return Err(ValidationError::DoubledSeparator(path.to_string())),
            "." | ".." => return Err(ValidationError::Traversal(path.to_string())),
            _ => {}
        }
        if segment.starts_with(' ') || segment.ends_with(' ') || segment.ends_with('.') {
            return Err(ValidationError::ReservedName(segment.to_string()));
        }
        if is_reserved(segment) {
            return Err(ValidationError::ReservedName(segment.to_string()));
        }
    }

    if path.starts_with(RESERVED_NOTE_PREFIX) {
        return Err(ValidationError::ReservedPrefix(RESERVED_NOTE_PREFIX));
    }

    for kind in IsolationKind::ALL {
        let branch = kind.branch_name(path);
        if !is_valid_branch_name(&branch) {
            return Err(ValidationError::InvalidBranchName(branch));
        }
    }

    debug!(path, "note path accepted");
    Ok(())
}

/// Validate note content. `allow_empty` is false for creation.
pub fn validate_content(
    content: &str,
    limits: &LimitsConfig,
    allow_empty: bool,
) -> Result<(), ValidationError> {
    const FIELD: &str = "note_value";

    if !allow_empty && content.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if content.len() > limits.max_content_bytes {
        return Err(ValidationError::ContentTooLarge {
            limit: limits.max_content_bytes,
        });
    }
    if content
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(ValidationError::ControlCharacter(FIELD));
    }
    Ok(())
}

/// Validate a repository name: one safe path segment.
pub fn validate_repo_name(name: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "repo_name";

    if name.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if name.len() > 100 {
        return Err(ValidationError::TooLong {
            field: FIELD,
            limit: 100,
        });
    }
    if name == "." || name == ".." {
        return Err(ValidationError::Traversal(name.to_string()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ValidationError::ForbiddenCharacter { field: FIELD, ch });
    }
    if name.starts_with('.') {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Validate a client-supplied branch name.
pub fn validate_branch_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty("branch_name"));
    }
    if !is_valid_branch_name(name) {
        return Err(ValidationError::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

/// Validate a version token: a hex object id or an unambiguous prefix.
pub fn validate_version_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::Empty("version_token"));
    }
    if !version_token_re().is_match(token) {
        return Err(ValidationError::InvalidVersionToken(token.to_string()));
    }
    Ok(())
}

fn is_valid_branch_name(name: &str) -> bool {
    !name.starts_with('-')
        && git2::Reference::is_valid_name(&format!("refs/heads/{name}"))
}

fn is_drive_prefixed(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_reserved(segment: &str) -> bool {
    if RESERVED_NAMES
        .iter()
        .any(|reserved| segment.eq_ignore_ascii_case(reserved))
    {
        return true;
    }
    let stem = segment.split('.').next().unwrap_or(segment);
    DEVICE_NAMES
        .iter()
        .any(|device| stem.eq_ignore_ascii_case(device))
}
