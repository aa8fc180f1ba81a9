use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{PersistedSession, SessionSlot, SessionSnapshotRepository, StorageError};

#[async_trait]
impl SessionSnapshotRepository for SqliteRepository {
    async fn load_snapshot(
        &self,
        slot: &SessionSlot,
    ) -> Result<Option<PersistedSession>, StorageError> {
        let row = sqlx::query("SELECT payload FROM session_snapshots WHERE slot = ?1")
            .bind(slot.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row
            .try_get("payload")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        PersistedSession::from_json(&payload).map(Some)
    }

    async fn save_snapshot(
        &self,
        slot: &SessionSlot,
        session: &PersistedSession,
    ) -> Result<(), StorageError> {
        let payload = session.to_json()?;
        sqlx::query(
            r"
            INSERT INTO session_snapshots (slot, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(slot) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(slot.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn clear_snapshot(&self, slot: &SessionSlot) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_snapshots WHERE slot = ?1")
            .bind(slot.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
