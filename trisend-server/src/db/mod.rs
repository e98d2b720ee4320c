//! Database module for the identity store

pub mod identities;
pub mod sql;

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

use crate::constants::{DATA_DIR_NAME, DATABASE_FILENAME};

pub use identities::{IdentityDb, IdentityRecord};

/// Database handle grouping the per-table accessors
///
/// `SqlitePool` uses `Arc` internally, so cloning is cheap.
#[derive(Clone)]
pub struct Database {
    pub identities: IdentityDb,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            identities: IdentityDb::new(pool),
        }
    }
}

/// Platform data directory for the daemon (e.g. `~/.local/share/trisendd`)
pub fn default_data_dir() -> Result<PathBuf, String> {
    dirs::data_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .ok_or_else(|| "Unable to determine the platform data directory".to_string())
}

/// Default database location inside the data directory
pub fn default_database_path() -> Result<PathBuf, String> {
    default_data_dir().map(|dir| dir.join(DATABASE_FILENAME))
}

/// Open (creating if needed) the database and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub mod testing {
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    /// In-memory database with migrations applied
    ///
    /// A single connection, since every `:memory:` connection is its own
    /// database.
    pub async fn create_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("open in-memory database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_db_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DATABASE_FILENAME);

        let pool = init_db(&path).await.unwrap();
        assert!(path.exists());

        let db = Database::new(pool.clone());
        db.identities.add_identity("fp", "alice", "").await.unwrap();
        pool.close().await;

        // Reopening keeps the data and reruns migrations harmlessly
        let db = Database::new(init_db(&path).await.unwrap());
        assert!(db.identities.get_identity("fp").await.unwrap().is_some());
    }

    #[test]
    fn test_default_database_path() {
        if let Ok(path) = default_database_path() {
            assert!(path.ends_with("trisendd/trisend.db"));
        }
    }
}
