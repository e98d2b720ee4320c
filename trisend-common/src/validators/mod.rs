//! Input validation functions
//!
//! Validators for the names a sender supplies: the exec command naming the
//! upload, and the paths an SFTP client writes to.

mod display_filename;
mod entry_path;

pub use display_filename::{
    DisplayFilename, DisplayFilenameError, MAX_DISPLAY_FILENAME_LENGTH, base_name, file_stem,
    parse_display_filename,
};
pub use entry_path::{EntryPathError, sanitize_entry_path};
