//! Trisend Common Library
//!
//! Shared types and defaults for the trisend transfer service: transfer
//! identifiers, the metadata a waiting upload exposes to the download side,
//! display filename validation, and machine-readable error kinds.

mod error_kind;
pub mod metadata;
pub mod time;
pub mod transfer_id;
pub mod validators;

pub use error_kind::ErrorKind;
pub use metadata::TransferMetadata;
pub use transfer_id::TransferId;

/// Default port for the HTTP download side
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default port for the SSH upload side
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default ceiling for a single transfer, in bytes (about 5.05 MB)
///
/// An upload that reaches this many bytes is rejected, it is not truncated.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5_295_309;

/// Default time an upload waits for a downloader, in seconds (10 minutes)
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 10 * time::SECONDS_PER_MINUTE;

/// Default public base URL used when printing download links
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Route prefix of the landing page
pub const DOWNLOAD_ROUTE: &str = "/download";

/// Route prefix of the direct (archive) download
pub const DIRECT_DOWNLOAD_ROUTE: &str = "/download/direct";

/// Build the landing page URL for a transfer
///
/// Trailing slashes on `public_url` are ignored so `http://host/` and
/// `http://host` produce the same link.
pub fn landing_url(public_url: &str, id: &TransferId) -> String {
    format!("{}{}/{}", public_url.trim_end_matches('/'), DOWNLOAD_ROUTE, id)
}

/// Build the direct download URL for a transfer
pub fn direct_url(public_url: &str, id: &TransferId) -> String {
    format!(
        "{}{}/{}",
        public_url.trim_end_matches('/'),
        DIRECT_DOWNLOAD_ROUTE,
        id
    )
}
