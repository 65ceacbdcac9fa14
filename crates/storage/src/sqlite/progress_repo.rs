use chrono::Utc;
use quiz_core::model::{LearnerId, Progress};
use sqlx::Row;

use super::mapping::{id_i64, ser, u32_from_i64};
use super::{SqliteRepository, conn_err};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn ensure_progress(&self, learner: LearnerId) -> Result<Progress, StorageError> {
        let learner_id = id_i64("learner_id", learner.value())?;
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        sqlx::query(
            r"
            INSERT INTO progress (learner_id, current_number, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id) DO NOTHING
            ",
        )
        .bind(learner_id)
        .bind(i64::from(Progress::START.current()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        let row = sqlx::query("SELECT current_number FROM progress WHERE learner_id = ?1")
            .bind(learner_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn_err)?;

        tx.commit().await.map_err(conn_err)?;

        let current = u32_from_i64(
            "current_number",
            row.try_get::<i64, _>("current_number").map_err(ser)?,
        )?;
        Ok(Progress::at(current))
    }

    async fn progress(&self, learner: LearnerId) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query("SELECT current_number FROM progress WHERE learner_id = ?1")
            .bind(id_i64("learner_id", learner.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.map(|row| {
            let current = u32_from_i64(
                "current_number",
                row.try_get::<i64, _>("current_number").map_err(ser)?,
            )?;
            Ok(Progress::at(current))
        })
        .transpose()
    }

    async fn set_progress(
        &self,
        learner: LearnerId,
        progress: Progress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO progress (learner_id, current_number, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id) DO UPDATE SET
                current_number = excluded.current_number,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_i64("learner_id", learner.value())?)
        .bind(i64::from(progress.current()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(())
    }
}
