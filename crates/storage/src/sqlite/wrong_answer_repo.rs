use chrono::{DateTime, Utc};
use quiz_core::model::{LearnerId, MissedQuestion, QuestionId};
use sqlx::Row;

use super::mapping::{id_i64, map_missed_row, map_optional_lossy, map_rows_lossy, ser, u32_from_i64};
use super::{SqliteRepository, conn_err};
use crate::repository::{StorageError, WrongAnswerRepository};

const MISSED_COLUMNS: &str = r"
    SELECT q.id AS id, q.number AS number, q.title AS title, q.options AS options,
           q.answer AS answer, w.wrong_count AS wrong_count,
           w.last_review_time AS last_review_time
    FROM wrong_answers w
    JOIN questions q ON q.id = w.question_id
";

#[async_trait::async_trait]
impl WrongAnswerRepository for SqliteRepository {
    async fn record_miss(
        &self,
        learner: LearnerId,
        question: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        // Single statement: concurrent misses from the same learner cannot lose an increment.
        let row = sqlx::query(
            r"
            INSERT INTO wrong_answers (learner_id, question_id, wrong_count, last_review_time)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(learner_id, question_id) DO UPDATE SET
                wrong_count = wrong_count + 1,
                last_review_time = excluded.last_review_time
            RETURNING wrong_count
            ",
        )
        .bind(id_i64("learner_id", learner.value())?)
        .bind(id_i64("question_id", question.value())?)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        u32_from_i64("wrong_count", row.try_get::<i64, _>("wrong_count").map_err(ser)?)
    }

    async fn merge_misses(
        &self,
        learner: LearnerId,
        misses: &[(QuestionId, u32)],
        at: DateTime<Utc>,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let learner_id = id_i64("learner_id", learner.value())?;
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let known = sqlx::query("SELECT 1 FROM learners WHERE id = ?1")
            .bind(learner_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn_err)?;
        if known.is_none() {
            return Err(StorageError::NotFound);
        }

        let mut merged = Vec::with_capacity(misses.len());
        for &(question, count) in misses {
            if count == 0 {
                continue;
            }
            let question_id = id_i64("question_id", question.value())?;
            let exists = sqlx::query("SELECT 1 FROM questions WHERE id = ?1")
                .bind(question_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn_err)?;
            if exists.is_none() {
                continue;
            }
            sqlx::query(
                r"
                INSERT INTO wrong_answers (learner_id, question_id, wrong_count, last_review_time)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(learner_id, question_id) DO UPDATE SET
                    wrong_count = wrong_count + excluded.wrong_count,
                    last_review_time = excluded.last_review_time
                ",
            )
            .bind(learner_id)
            .bind(question_id)
            .bind(i64::from(count))
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?;
            merged.push(question);
        }

        tx.commit().await.map_err(conn_err)?;
        Ok(merged)
    }

    async fn remove_miss(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM wrong_answers WHERE learner_id = ?1 AND question_id = ?2")
            .bind(id_i64("learner_id", learner.value())?)
            .bind(id_i64("question_id", question.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn misses(&self, learner: LearnerId) -> Result<Vec<MissedQuestion>, StorageError> {
        let sql = format!(
            "{MISSED_COLUMNS} WHERE w.learner_id = ?1
             ORDER BY w.last_review_time DESC, w.wrong_count DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        Ok(map_rows_lossy(&rows, "wrong answer", map_missed_row))
    }

    async fn miss_count(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM wrong_answers WHERE learner_id = ?1")
            .bind(id_i64("learner_id", learner.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?;
        u32_from_i64("count", row.try_get::<i64, _>("n").map_err(ser)?)
    }

    async fn miss_entry(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        let sql = format!("{MISSED_COLUMNS} WHERE w.learner_id = ?1 AND w.question_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner.value())?)
            .bind(id_i64("question_id", question.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        Ok(map_optional_lossy(row, "wrong answer", map_missed_row))
    }

    async fn next_miss_after(
        &self,
        learner: LearnerId,
        current_number: u32,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        // Numbers above the current one sort first; the rest follow, which gives the wrap.
        let sql = format!(
            "{MISSED_COLUMNS} WHERE w.learner_id = ?1
             ORDER BY CASE WHEN q.number > ?2 THEN 0 ELSE 1 END, q.number ASC
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner.value())?)
            .bind(i64::from(current_number))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        Ok(map_optional_lossy(row, "wrong answer", map_missed_row))
    }

    async fn first_miss(&self, learner: LearnerId) -> Result<Option<MissedQuestion>, StorageError> {
        let sql = format!("{MISSED_COLUMNS} WHERE w.learner_id = ?1 ORDER BY q.number ASC LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        Ok(map_optional_lossy(row, "wrong answer", map_missed_row))
    }
}
