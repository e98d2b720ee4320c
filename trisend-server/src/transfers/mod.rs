//! Pairing SSH uploads with HTTP downloads
//!
//! An upload (exec or SFTP) registers a transfer and waits. A download
//! request resolves it and hands over a response sink. The upload then
//! stages the bytes, enforces the size ceiling, packages them as a zip
//! archive and streams the archive into the sink.
//!
//! **Exec flow:**
//! 1. Parse the display filename from the command
//! 2. Register, print the link, wait for a downloader (or expire)
//! 3. Stage stdin up to the ceiling
//! 4. Archive, write the response head, stream, signal completion
//!
//! **SFTP flow:**
//! 1. First file opened for writing registers the transfer and waits
//! 2. Every closed file becomes an archive entry
//! 3. When the SFTP session ends, finish the archive and stream it

mod archive;
mod error;
mod exec;
mod handoff;
mod output;
mod registry;
mod sftp;
mod staging;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use trisend_common::{
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PUBLIC_URL, DEFAULT_TRANSFER_TIMEOUT_SECS, TransferId,
    landing_url,
};

pub use archive::{ArchiveWriter, archive_headers, single_entry_archive, stream_archive};
pub use error::{TransferError, TransferFailure, format_limit};
pub use exec::run_exec;
pub use handoff::{
    BODY_CHANNEL_CAPACITY, ConsumerSide, Handoff, HandoffReceiver, HandoffSender, OutcomeSignal,
    ResponseSink, STREAM_CHUNK_SIZE, TransferOutcome, handoff_channel,
};
pub use output::{CapturedOutput, SessionOutput};
pub use registry::{RegistrationGuard, TransferRegistry};
pub use sftp::{SftpFinisher, SftpHandler, sftp_session};
pub use staging::StagingFile;

/// Exit status of a successful upload session
pub const EXIT_SUCCESS: u32 = 0;

/// Exit status of a failed upload session
pub const EXIT_FAILURE: u32 = 1;

/// Limits and addressing shared by every transfer
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Base URL printed in download links
    pub public_url: String,
    /// Size ceiling; reaching it fails the transfer
    pub max_upload_bytes: u64,
    /// How long an upload waits for a downloader
    pub timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            timeout: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

/// Everything an upload or download handler needs
#[derive(Clone)]
pub struct TransferContext {
    pub registry: Arc<TransferRegistry>,
    pub settings: Arc<TransferSettings>,
}

impl TransferContext {
    pub fn new(registry: Arc<TransferRegistry>, settings: TransferSettings) -> Self {
        Self {
            registry,
            settings: Arc::new(settings),
        }
    }

    /// Deadline for a transfer registered now
    pub fn expires_at(&self) -> Instant {
        Instant::now() + self.settings.timeout
    }

    /// Landing page URL for a transfer
    pub fn landing_url(&self, id: &TransferId) -> String {
        landing_url(&self.settings.public_url, id)
    }
}

/// Wait for a downloader until `expires_at`
///
/// The channel closing early means the entry was removed under us: either
/// it expired and was swept, or a downloader claimed it and went away.
pub async fn await_handoff(
    handoff_rx: HandoffReceiver,
    expires_at: Instant,
) -> Result<Handoff, TransferError> {
    match tokio::time::timeout_at(expires_at, handoff_rx).await {
        Ok(Ok(handoff)) => Ok(handoff),
        Ok(Err(_)) if Instant::now() >= expires_at => Err(TransferError::RendezvousTimeout),
        Ok(Err(_)) => Err(TransferError::ConsumerGone),
        Err(_) => Err(TransferError::RendezvousTimeout),
    }
}

/// Log a failed session and tell the sender why
///
/// Returns the exit status to end the session with.
pub async fn report_failure<O>(output: &O, error: &TransferError) -> u32
where
    O: SessionOutput + ?Sized,
{
    match error {
        TransferError::Transport(e) => warn!(kind = %error.kind(), error = %e, "transfer failed"),
        _ => debug!(kind = %error.kind(), "transfer failed: {}", error),
    }
    output.stderr(&format!("{error}\n")).await;
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use trisend_common::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_await_handoff_times_out() {
        let (_tx, rx) = handoff_channel();
        let expires_at = Instant::now() + Duration::from_secs(5);

        let result = await_handoff(rx, expires_at).await;
        assert!(matches!(result, Err(TransferError::RendezvousTimeout)));
    }

    #[tokio::test]
    async fn test_await_handoff_receives() {
        let (tx, rx) = handoff_channel();
        let (handoff, _consumer) = Handoff::pair();
        assert!(tx.send(handoff).is_ok());

        let expires_at = Instant::now() + Duration::from_secs(5);
        assert!(await_handoff(rx, expires_at).await.is_ok());
    }

    #[tokio::test]
    async fn test_await_handoff_consumer_dropped_sender() {
        let (tx, rx) = handoff_channel();
        drop(tx);

        let expires_at = Instant::now() + Duration::from_secs(5);
        let result = await_handoff(rx, expires_at).await;
        assert!(matches!(result, Err(TransferError::ConsumerGone)));
    }

    #[tokio::test]
    async fn test_report_failure_writes_stderr() {
        let output = CapturedOutput::new();
        let status = report_failure(&output, &TransferError::Usage).await;

        assert_eq!(status, EXIT_FAILURE);
        assert_eq!(output.stderr_text(), "usage: ssh <host> <filename> < <filepath>\n");
        assert!(output.stdout_text().is_empty());
        assert_eq!(TransferError::Usage.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_default_settings() {
        let settings = TransferSettings::default();
        assert_eq!(settings.max_upload_bytes, 5_295_309);
        assert_eq!(settings.timeout, Duration::from_secs(600));
        assert_eq!(settings.public_url, "http://localhost:3000");
    }

    #[test]
    fn test_context_landing_url() {
        let ctx = TransferContext::new(
            Arc::new(TransferRegistry::new()),
            TransferSettings {
                public_url: "https://send.example.com/".to_string(),
                ..TransferSettings::default()
            },
        );
        let id = TransferId::generate();
        assert_eq!(
            ctx.landing_url(&id),
            format!("https://send.example.com/download/{id}")
        );
    }
}
