//! Machine-readable error kinds for transfer failures
//!
//! These strings appear in logs and in the failure view served to a waiting
//! downloader, so they are stable across releases.

use std::fmt;

/// Category of a failed or refused transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The SSH key is not associated with any account
    Authorization,

    /// The exec command did not name a usable file
    Usage,

    /// The upload reached the configured size ceiling
    CapacityExceeded,

    /// No downloader arrived before the transfer expired
    RendezvousTimeout,

    /// I/O failure on either side, including a downloader that went away
    Transport,

    /// The SFTP client asked for an operation this service does not offer
    Unsupported,
}

impl ErrorKind {
    /// Convert to the string representation used in logs and views
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Usage => "usage",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::RendezvousTimeout => "rendezvous_timeout",
            Self::Transport => "transport",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization" => Some(Self::Authorization),
            "usage" => Some(Self::Usage),
            "capacity_exceeded" => Some(Self::CapacityExceeded),
            "rendezvous_timeout" => Some(Self::RendezvousTimeout),
            "transport" => Some(Self::Transport),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorKind; 6] = [
        ErrorKind::Authorization,
        ErrorKind::Usage,
        ErrorKind::CapacityExceeded,
        ErrorKind::RendezvousTimeout,
        ErrorKind::Transport,
        ErrorKind::Unsupported,
    ];

    #[test]
    fn test_as_str() {
        assert_eq!(ErrorKind::Authorization.as_str(), "authorization");
        assert_eq!(ErrorKind::CapacityExceeded.as_str(), "capacity_exceeded");
        assert_eq!(ErrorKind::RendezvousTimeout.as_str(), "rendezvous_timeout");
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(ErrorKind::parse("unknown"), None);
        assert_eq!(ErrorKind::parse(""), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorKind::Transport), "transport");
    }

    #[test]
    fn test_into_string() {
        let s: String = ErrorKind::Usage.into();
        assert_eq!(s, "usage");
    }

    #[test]
    fn test_roundtrip() {
        for kind in ALL {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
        }
    }
}
