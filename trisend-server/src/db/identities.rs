//! SSH key to account database operations

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use crate::db::sql;
use crate::identity::{Identity, IdentityLookup};

/// A registered key from the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub fingerprint: String,
    pub username: String,
    pub avatar: String,
    pub created_at: i64,
}

/// Row type for identity queries
type IdentityRow = (String, String, String, i64);

impl From<IdentityRow> for IdentityRecord {
    fn from(row: IdentityRow) -> Self {
        Self {
            fingerprint: row.0,
            username: row.1,
            avatar: row.2,
            created_at: row.3,
        }
    }
}

impl From<IdentityRecord> for Identity {
    fn from(record: IdentityRecord) -> Self {
        Self {
            username: record.username,
            avatar: record.avatar,
        }
    }
}

/// Database access for identity operations
#[derive(Clone)]
pub struct IdentityDb {
    pool: SqlitePool,
}

impl IdentityDb {
    /// Create a new IdentityDb instance
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get current Unix timestamp
    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_secs() as i64
    }

    /// Register a key for an account (upsert)
    ///
    /// A key already registered moves to the new account.
    pub async fn add_identity(
        &self,
        fingerprint: &str,
        username: &str,
        avatar: &str,
    ) -> Result<IdentityRecord, sqlx::Error> {
        sqlx::query(sql::SQL_UPSERT_IDENTITY)
            .bind(fingerprint)
            .bind(username)
            .bind(avatar)
            .bind(Self::now())
            .execute(&self.pool)
            .await?;

        self.get_identity(fingerprint)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Remove a key; returns whether it was registered
    pub async fn remove_key(&self, fingerprint: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(sql::SQL_DELETE_IDENTITY)
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the record for a key
    pub async fn get_identity(
        &self,
        fingerprint: &str,
    ) -> Result<Option<IdentityRecord>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(sql::SQL_SELECT_IDENTITY_BY_FINGERPRINT)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(IdentityRecord::from))
    }

    /// List every registered key
    pub async fn list_identities(&self) -> Result<Vec<IdentityRecord>, sqlx::Error> {
        let rows: Vec<IdentityRow> = sqlx::query_as(sql::SQL_LIST_IDENTITIES)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(IdentityRecord::from).collect())
    }
}

#[async_trait]
impl IdentityLookup for IdentityDb {
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Option<Identity> {
        match self.get_identity(fingerprint).await {
            Ok(record) => record.map(Identity::from),
            Err(e) => {
                // Treated as "no account": the sender sees the usual message
                warn!(error = %e, "identity lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::create_test_db;

    const FINGERPRINT: &str = "LKHY41Geto3UJEOmA7w8t1rAhyxidys+HEf7GvbUenc";
    const OTHER_FINGERPRINT: &str = "lxtL/PW/4/d7Sv6sL4/EmWLdxS2W8aV+oz0LIY7dAHA";

    #[tokio::test]
    async fn test_add_and_lookup() {
        let pool = create_test_db().await;
        let db = IdentityDb::new(pool);

        let record = db
            .add_identity(FINGERPRINT, "alice", "https://example.com/alice.png")
            .await
            .expect("add identity");
        assert_eq!(record.username, "alice");
        assert_eq!(record.fingerprint, FINGERPRINT);

        let identity = db.lookup_by_fingerprint(FINGERPRINT).await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.avatar, "https://example.com/alice.png");

        assert!(db.lookup_by_fingerprint(OTHER_FINGERPRINT).await.is_none());
    }

    #[tokio::test]
    async fn test_readding_key_moves_it() {
        let pool = create_test_db().await;
        let db = IdentityDb::new(pool);

        let first = db.add_identity(FINGERPRINT, "alice", "").await.unwrap();
        let second = db.add_identity(FINGERPRINT, "bob", "").await.unwrap();

        assert_eq!(second.username, "bob");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(db.list_identities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_key() {
        let pool = create_test_db().await;
        let db = IdentityDb::new(pool);
        db.add_identity(FINGERPRINT, "alice", "").await.unwrap();

        assert!(db.remove_key(FINGERPRINT).await.unwrap());
        assert!(!db.remove_key(FINGERPRINT).await.unwrap());
        assert!(db.lookup_by_fingerprint(FINGERPRINT).await.is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_username() {
        let pool = create_test_db().await;
        let db = IdentityDb::new(pool);
        db.add_identity(FINGERPRINT, "zed", "").await.unwrap();
        db.add_identity(OTHER_FINGERPRINT, "Alice", "").await.unwrap();

        let names: Vec<String> = db
            .list_identities()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.username)
            .collect();
        assert_eq!(names, vec!["Alice", "zed"]);
    }

    #[tokio::test]
    async fn test_several_keys_per_account() {
        let pool = create_test_db().await;
        let db = IdentityDb::new(pool);
        db.add_identity(FINGERPRINT, "alice", "").await.unwrap();
        db.add_identity(OTHER_FINGERPRINT, "alice", "").await.unwrap();

        assert_eq!(
            db.lookup_by_fingerprint(FINGERPRINT).await,
            db.lookup_by_fingerprint(OTHER_FINGERPRINT).await
        );
    }
}
