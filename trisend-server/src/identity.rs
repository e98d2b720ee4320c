//! Mapping SSH public keys to accounts
//!
//! A key is identified by its fingerprint: SHA-256 over the SSH wire encoding
//! of the public key, rendered as unpadded standard base64. This is the same
//! value `ssh-keygen -l` prints after `SHA256:`.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use russh_keys::PublicKeyBase64;
use russh_keys::key::PublicKey;
use sha2::{Digest, Sha256};

use crate::constants::ERR_PARSE_PUBLIC_KEY;

/// The account an SSH key belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Avatar URL, empty if none
    pub avatar: String,
}

/// Looks up the account owning a key fingerprint
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Option<Identity>;
}

/// Fixed in-memory identity table
#[derive(Debug, Default, Clone)]
pub struct StaticIdentities {
    by_fingerprint: HashMap<String, Identity>,
}

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, identity: Identity) {
        self.by_fingerprint.insert(fingerprint.into(), identity);
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentities {
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Option<Identity> {
        self.by_fingerprint.get(fingerprint).cloned()
    }
}

/// Fingerprint of an SSH public key wire blob
pub fn fingerprint_blob(blob: &[u8]) -> String {
    let digest = Sha256::digest(blob);
    STANDARD_NO_PAD.encode(digest)
}

/// Fingerprint of a public key presented during authentication
pub fn fingerprint(key: &PublicKey) -> String {
    fingerprint_blob(&key.public_key_bytes())
}

/// Parse one `authorized_keys`-style line ("ssh-ed25519 AAAA... comment")
pub fn parse_authorized_key(line: &str) -> Result<PublicKey, String> {
    let mut fields = line.split_whitespace();
    let (Some(_algorithm), Some(data)) = (fields.next(), fields.next()) else {
        return Err(format!("{}expected \"<type> <base64> [comment]\"", ERR_PARSE_PUBLIC_KEY));
    };

    russh_keys::parse_public_key_base64(data).map_err(|e| format!("{}{}", ERR_PARSE_PUBLIC_KEY, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIA/beBbJl8fXI5eBUADHL1dQCwyAU8NBXIsMojthKhRA alice@laptop";
    const ALICE_FINGERPRINT: &str = "LKHY41Geto3UJEOmA7w8t1rAhyxidys+HEf7GvbUenc";
    const BOB_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAQ606TuprUc3Vqn/TqOzaMKw7o/LQAHJNF1o+6PrG8r bob@desktop";
    const BOB_FINGERPRINT: &str = "lxtL/PW/4/d7Sv6sL4/EmWLdxS2W8aV+oz0LIY7dAHA";

    #[test]
    fn test_fingerprint_matches_ssh_keygen() {
        let alice = parse_authorized_key(ALICE_KEY).unwrap();
        assert_eq!(fingerprint(&alice), ALICE_FINGERPRINT);

        let bob = parse_authorized_key(BOB_KEY).unwrap();
        assert_eq!(fingerprint(&bob), BOB_FINGERPRINT);
    }

    #[test]
    fn test_fingerprint_blob_is_unpadded() {
        let fp = fingerprint_blob(b"anything");
        assert_eq!(fp.len(), 43);
        assert!(!fp.ends_with('='));
    }

    #[test]
    fn test_parse_without_comment() {
        let line = ALICE_KEY.rsplit_once(' ').unwrap().0;
        let key = parse_authorized_key(line).unwrap();
        assert_eq!(fingerprint(&key), ALICE_FINGERPRINT);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_authorized_key("").is_err());
        assert!(parse_authorized_key("ssh-ed25519").is_err());
        assert!(parse_authorized_key("ssh-ed25519 not-base64!!").is_err());
    }

    #[tokio::test]
    async fn test_static_identities() {
        let mut identities = StaticIdentities::new();
        identities.insert(
            ALICE_FINGERPRINT,
            Identity {
                username: "alice".to_string(),
                avatar: String::new(),
            },
        );

        let found = identities.lookup_by_fingerprint(ALICE_FINGERPRINT).await;
        assert_eq!(found.unwrap().username, "alice");
        assert!(identities.lookup_by_fingerprint(BOB_FINGERPRINT).await.is_none());
    }
}
