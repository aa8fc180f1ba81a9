use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{QuestionRepository, SessionSnapshotRepository, Storage};

mod mapping;
mod migrate;
mod question_repo;
mod snapshot_repo;

/// One learner session touches the database at a time; a small pool suffices.
const MAX_CONNECTIONS: u32 = 4;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Question bank and snapshot slots over a `SQLite` pool.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Open a pool for `database_url` with foreign keys, WAL and a busy timeout.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL does not parse or no connection can
    /// be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;
        tracing::debug!(database_url, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// Bring the schema up to date. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Connect, migrate, and expose both repositories over one pool.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        Ok(Self {
            questions: Arc::new(repo.clone()) as Arc<dyn QuestionRepository>,
            snapshots: Arc::new(repo) as Arc<dyn SessionSnapshotRepository>,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{SessionSlot, StorageError};

    async fn in_memory(name: &str) -> SqliteRepository {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let repo = SqliteRepository::connect(&url).await.expect("connect");
        repo.migrate().await.expect("migrate");
        repo
    }

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let repo = in_memory("unit_migrate").await;
        repo.migrate().await.expect("second migrate");

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let repo = in_memory("unit_pragmas").await;
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn unreadable_snapshot_payload_is_a_serialization_error() {
        let repo = in_memory("unit_corrupt").await;
        sqlx::query(
            "INSERT INTO session_snapshots (slot, payload, updated_at) VALUES (?1, '{not json', '2024-01-01T00:00:00Z')",
        )
        .bind(SessionSlot::default().as_str())
        .execute(&repo.pool)
        .await
        .unwrap();

        let err = repo
            .load_snapshot(&SessionSlot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
