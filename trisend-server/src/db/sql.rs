//! SQL query constants for database operations
//!
//! This module contains all SQL queries used by the database layer.
//! Each query is documented with its parameters and special behaviors.

// ========================================================================
// Identity Query Operations
// ========================================================================

/// Insert a key or move an existing key to another account
///
/// **Parameters:**
/// 1. `fingerprint: &str` - Unpadded base64 SHA-256 of the key blob
/// 2. `username: &str` - Account the key belongs to
/// 3. `avatar: &str` - Avatar URL, empty for none
/// 4. `created_at: i64` - Unix timestamp
///
/// **Note:** On conflict the username and avatar are replaced but the
/// original `created_at` is kept.
pub const SQL_UPSERT_IDENTITY: &str = "INSERT INTO identities (fingerprint, username, avatar, created_at) VALUES (?, ?, ?, ?) \
     ON CONFLICT(fingerprint) DO UPDATE SET username = excluded.username, avatar = excluded.avatar";

/// Select the account owning a key
///
/// **Parameters:**
/// 1. `fingerprint: &str` - Key fingerprint
///
/// **Returns:** `(fingerprint, username, avatar, created_at)`
pub const SQL_SELECT_IDENTITY_BY_FINGERPRINT: &str =
    "SELECT fingerprint, username, avatar, created_at FROM identities WHERE fingerprint = ?";

/// Delete a key
///
/// **Parameters:**
/// 1. `fingerprint: &str` - Key fingerprint
pub const SQL_DELETE_IDENTITY: &str = "DELETE FROM identities WHERE fingerprint = ?";

/// List every registered key, grouped by account
///
/// **Parameters:** None
///
/// **Returns:** `(fingerprint, username, avatar, created_at)` rows ordered
/// by username, then registration time
pub const SQL_LIST_IDENTITIES: &str = "SELECT fingerprint, username, avatar, created_at FROM identities ORDER BY LOWER(username), created_at";
