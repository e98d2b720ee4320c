//! Display filename parsing
//!
//! The exec command of an upload names the file being sent. The base name is
//! kept as the archive entry name and its stem (extension stripped) becomes
//! the name shown to the downloader.

/// Maximum length for a display filename in bytes
pub const MAX_DISPLAY_FILENAME_LENGTH: usize = 255;

/// Validation error for display filenames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayFilenameError {
    /// No name given, or nothing left after stripping the extension
    Empty,
    /// Name exceeds maximum length
    TooLong,
    /// Name contains control characters (including null)
    InvalidCharacters,
}

/// A parsed display filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFilename {
    /// Base name as given, used as the archive entry name ("report.pdf")
    pub name: String,
    /// Base name without its extension, shown to the downloader ("report")
    pub stem: String,
}

/// Last path component, ignoring trailing separators
///
/// Both `/` and `\` separate components. Returns an empty string when the
/// input has no non-separator characters.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Strip the extension (from the last `.` onward) from a base name
///
/// A leading dot counts as an extension separator, so `.bashrc` has an empty
/// stem.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Parse the exec command of an upload into a display filename
///
/// Checks:
/// - Not empty after trimming whitespace
/// - Does not exceed maximum length (255 bytes)
/// - No control characters
/// - Base name is not `.` or `..` and has a non-empty stem
///
/// # Errors
///
/// Returns a `DisplayFilenameError` variant describing the validation failure.
pub fn parse_display_filename(command: &str) -> Result<DisplayFilename, DisplayFilenameError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(DisplayFilenameError::Empty);
    }

    if command.len() > MAX_DISPLAY_FILENAME_LENGTH {
        return Err(DisplayFilenameError::TooLong);
    }

    if command.chars().any(char::is_control) {
        return Err(DisplayFilenameError::InvalidCharacters);
    }

    let name = base_name(command);
    if name == "." || name == ".." {
        return Err(DisplayFilenameError::Empty);
    }

    let stem = file_stem(name).trim();
    if stem.is_empty() {
        return Err(DisplayFilenameError::Empty);
    }

    Ok(DisplayFilename {
        name: name.to_string(),
        stem: stem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        let parsed = parse_display_filename("report.pdf").unwrap();
        assert_eq!(parsed.name, "report.pdf");
        assert_eq!(parsed.stem, "report");
    }

    #[test]
    fn test_strips_only_last_extension() {
        let parsed = parse_display_filename("backup.tar.gz").unwrap();
        assert_eq!(parsed.name, "backup.tar.gz");
        assert_eq!(parsed.stem, "backup.tar");
    }

    #[test]
    fn test_no_extension() {
        let parsed = parse_display_filename("README").unwrap();
        assert_eq!(parsed.name, "README");
        assert_eq!(parsed.stem, "README");
    }

    #[test]
    fn test_takes_base_name() {
        let parsed = parse_display_filename("  /home/alice/docs/notes.txt\n").unwrap();
        assert_eq!(parsed.name, "notes.txt");
        assert_eq!(parsed.stem, "notes");

        let parsed = parse_display_filename("C:\\Users\\bob\\photo.jpg").unwrap();
        assert_eq!(parsed.name, "photo.jpg");

        let parsed = parse_display_filename("photos/").unwrap();
        assert_eq!(parsed.name, "photos");
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse_display_filename(""), Err(DisplayFilenameError::Empty));
        assert_eq!(parse_display_filename("   "), Err(DisplayFilenameError::Empty));
        assert_eq!(parse_display_filename("/"), Err(DisplayFilenameError::Empty));
        assert_eq!(parse_display_filename(".."), Err(DisplayFilenameError::Empty));
        assert_eq!(parse_display_filename("a/."), Err(DisplayFilenameError::Empty));
    }

    #[test]
    fn test_empty_stem() {
        assert_eq!(
            parse_display_filename(".bashrc"),
            Err(DisplayFilenameError::Empty)
        );
        assert_eq!(
            parse_display_filename("dir/.env"),
            Err(DisplayFilenameError::Empty)
        );
    }

    #[test]
    fn test_too_long() {
        let long_name = format!("{}.txt", "a".repeat(MAX_DISPLAY_FILENAME_LENGTH));
        assert_eq!(
            parse_display_filename(&long_name),
            Err(DisplayFilenameError::TooLong)
        );

        let max_name = "a".repeat(MAX_DISPLAY_FILENAME_LENGTH);
        assert!(parse_display_filename(&max_name).is_ok());
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            parse_display_filename("bad\0name.txt"),
            Err(DisplayFilenameError::InvalidCharacters)
        );
        assert_eq!(
            parse_display_filename("bad\x1bname.txt"),
            Err(DisplayFilenameError::InvalidCharacters)
        );
    }

    #[test]
    fn test_unicode() {
        let parsed = parse_display_filename("résumé.pdf").unwrap();
        assert_eq!(parsed.stem, "résumé");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(base_name("a/b/c"), "c");
        assert_eq!(base_name("c"), "c");
        assert_eq!(base_name("///"), "");
        assert_eq!(file_stem("a.b.c"), "a.b");
        assert_eq!(file_stem("abc"), "abc");
        assert_eq!(file_stem(".abc"), "");
    }
}
