//! Archive entry path sanitization
//!
//! SFTP clients write to absolute or relative paths chosen by the sender.
//! Those paths end up as entry names in a zip archive opened by someone else,
//! so they are reduced to plain relative paths first.

/// Validation error for archive entry paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPathError {
    /// No usable component left after sanitization
    Empty,
    /// Path contains control characters (including null)
    InvalidCharacters,
}

/// Reduce a client path to a safe, relative, `/`-separated entry name
///
/// Backslashes are treated as separators. Empty and `.` components are
/// dropped, and `..` removes the component before it. A `..` at the root
/// stays at the root, so the result can never escape the archive.
///
/// # Errors
///
/// Returns an `EntryPathError` variant describing the validation failure.
pub fn sanitize_entry_path(path: &str) -> Result<String, EntryPathError> {
    if path.chars().any(char::is_control) {
        return Err(EntryPathError::InvalidCharacters);
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(EntryPathError::Empty);
    }

    Ok(parts.join("/"))
}
