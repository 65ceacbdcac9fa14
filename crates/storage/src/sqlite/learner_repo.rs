use chrono::{DateTime, Utc};
use quiz_core::model::{Learner, LearnerId, Role};

use super::mapping::{id_i64, map_learner_row};
use super::{SqliteRepository, conn_err};
use crate::repository::{LearnerRepository, StorageError};

#[async_trait::async_trait]
impl LearnerRepository for SqliteRepository {
    async fn learner_by_handle(&self, handle: &str) -> Result<Option<Learner>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, handle, role, created_at
            FROM learners WHERE handle = ?1
            ",
        )
        .bind(handle.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_learner_row).transpose()
    }

    async fn learner_by_id(&self, id: LearnerId) -> Result<Option<Learner>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, handle, role, created_at
            FROM learners WHERE id = ?1
            ",
        )
        .bind(id_i64("learner_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_learner_row).transpose()
    }

    async fn ensure_learner(
        &self,
        handle: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<Learner, StorageError> {
        let handle = handle.trim();
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        sqlx::query(
            r"
            INSERT INTO learners (handle, role, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(handle) DO NOTHING
            ",
        )
        .bind(handle)
        .bind(role.as_str())
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        let row = sqlx::query(
            r"
            SELECT id, handle, role, created_at
            FROM learners WHERE handle = ?1
            ",
        )
        .bind(handle)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn_err)?;

        tx.commit().await.map_err(conn_err)?;
        map_learner_row(&row)
    }

    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, handle, role, created_at
            FROM learners
            ORDER BY created_at DESC, id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_learner_row).collect()
    }

    async fn set_role(&self, id: LearnerId, role: Role) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE learners SET role = ?1 WHERE id = ?2")
            .bind(role.as_str())
            .bind(id_i64("learner_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
