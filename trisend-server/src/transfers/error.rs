//! Transfer error taxonomy

use std::io;

use thiserror::Error;
use trisend_common::ErrorKind;

use crate::constants::{
    BYTES_PER_MEGABYTE, ERR_CONSUMER_GONE, ERR_EXPIRED, ERR_LIMIT_REACHED, ERR_NO_ACCOUNT,
    ERR_TRANSPORT, ERR_UNSUPPORTED, ERR_USAGE,
};

/// Why a transfer did not complete
///
/// The `Display` text is what the uploader sees on stderr.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{}", ERR_NO_ACCOUNT)]
    Authorization,

    #[error("{}", ERR_USAGE)]
    Usage,

    #[error("{}{}", ERR_LIMIT_REACHED, format_limit(*.limit))]
    CapacityExceeded { limit: u64 },

    #[error("{}", ERR_EXPIRED)]
    RendezvousTimeout,

    #[error("{}{}", ERR_TRANSPORT, .0)]
    Transport(#[from] io::Error),

    #[error("{}", ERR_UNSUPPORTED)]
    Unsupported,

    #[error("{}", ERR_CONSUMER_GONE)]
    ConsumerGone,
}

impl TransferError {
    /// Machine-readable category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization => ErrorKind::Authorization,
            Self::Usage => ErrorKind::Usage,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::RendezvousTimeout => ErrorKind::RendezvousTimeout,
            Self::Transport(_) | Self::ConsumerGone => ErrorKind::Transport,
            Self::Unsupported => ErrorKind::Unsupported,
        }
    }

    /// Failure reported to an attached downloader
    pub fn to_failure(&self) -> TransferFailure {
        TransferFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Failure carried over the outcome signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransferFailure {
    /// Failure sent when a producer drops its signal without firing it
    pub fn aborted() -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: "upload aborted before completion".to_string(),
        }
    }
}

/// Render a byte ceiling the way the uploader sees it ("5.05 MB")
pub fn format_limit(limit: u64) -> String {
    format!("{:.2} MB", limit as f64 / BYTES_PER_MEGABYTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_limit() {
        assert_eq!(format_limit(5_295_309), "5.05 MB");
        assert_eq!(format_limit(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_capacity_message() {
        let err = TransferError::CapacityExceeded { limit: 5_295_309 };
        assert_eq!(err.to_string(), "Limit reached: 5.05 MB");
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(TransferError::Authorization.kind(), ErrorKind::Authorization);
        assert_eq!(TransferError::Usage.kind(), ErrorKind::Usage);
        assert_eq!(
            TransferError::RendezvousTimeout.kind(),
            ErrorKind::RendezvousTimeout
        );
        assert_eq!(TransferError::ConsumerGone.kind(), ErrorKind::Transport);
        assert_eq!(
            TransferError::from(io::Error::other("disk full")).kind(),
            ErrorKind::Transport
        );
        assert_eq!(TransferError::Unsupported.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_to_failure() {
        let failure = TransferError::RendezvousTimeout.to_failure();
        assert_eq!(failure.kind, ErrorKind::RendezvousTimeout);
        assert_eq!(failure.message, ERR_EXPIRED);
    }

    #[test]
    fn test_transport_message() {
        let err = TransferError::from(io::Error::other("disk full"));
        assert_eq!(err.to_string(), "Transfer failed: disk full");
    }
}
