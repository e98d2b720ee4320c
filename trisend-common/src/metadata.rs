//! Metadata a waiting upload exposes to the download side

use std::time::Duration;

use tokio::time::Instant;

/// Everything the download side may learn about a waiting transfer
///
/// Created by the uploading session when it registers, read by the HTTP side
/// to render the landing page and the archive filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    /// Display name of the uploading account
    pub owner_display_name: String,
    /// Avatar reference (URL) of the uploading account, empty if none
    pub owner_avatar: String,
    /// Name shown to the downloader; the archive is `<display_filename>.zip`
    pub display_filename: String,
    /// Instant after which the transfer can no longer be resolved
    pub expires_at: Instant,
}

impl TransferMetadata {
    /// Whether the transfer is past its deadline at `now`
    ///
    /// The deadline itself is already expired: a transfer is live only while
    /// `now < expires_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Whether the transfer is past its deadline right now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Filename offered to the browser for the archive
    pub fn archive_filename(&self) -> String {
        format!("{}.zip", self.display_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(expires_at: Instant) -> TransferMetadata {
        TransferMetadata {
            owner_display_name: "alice".to_string(),
            owner_avatar: String::new(),
            display_filename: "report".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_archive_filename() {
        let meta = metadata(Instant::now());
        assert_eq!(meta.archive_filename(), "report.zip");
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Instant::now();
        let meta = metadata(now + Duration::from_secs(10));
        assert!(!meta.is_expired_at(now));
        assert!(!meta.is_expired_at(now + Duration::from_secs(9)));
        assert!(meta.is_expired_at(now + Duration::from_secs(10)));
        assert!(meta.is_expired_at(now + Duration::from_secs(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_saturates() {
        let meta = metadata(Instant::now() + Duration::from_secs(5));
        assert_eq!(meta.remaining(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(meta.remaining(), Duration::ZERO);
        assert!(meta.is_expired());
    }
}
