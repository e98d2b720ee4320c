//! Transfer identifiers
//!
//! A transfer identifier is the only secret protecting a waiting upload, so it
//! is drawn from the OS-seeded thread RNG and carries 128 bits of entropy. It
//! is rendered as lowercase hex, which is safe in a URL path segment without
//! escaping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of random bytes in a transfer identifier
pub const TRANSFER_ID_BYTES: usize = 16;

/// Length of the hex rendering of a transfer identifier
pub const TRANSFER_ID_HEX_LENGTH: usize = TRANSFER_ID_BYTES * 2;

/// Opaque, unguessable identifier for one in-flight transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; TRANSFER_ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Parse an identifier taken from a URL path segment
    ///
    /// Returns `None` unless the input has exactly the shape produced by
    /// [`TransferId::generate`], so arbitrary request paths never reach the
    /// registry.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != TRANSFER_ID_HEX_LENGTH {
            return None;
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
