use chrono::Utc;
use quiz_core::model::{Question, QuestionId, ValidatedQuestion};
use sqlx::Row;

use super::mapping::{
    encode_options, id_i64, map_optional_lossy, map_question_row, map_rows_lossy,
    question_id_from_i64, ser, u32_from_i64,
};
use super::{SqliteRepository, conn_err};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(
        &self,
        question: &ValidatedQuestion,
    ) -> Result<QuestionId, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO questions (number, title, options, answer, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(number) DO UPDATE SET
                -- id and created_at stay stable so ledger rows keep pointing at the question
                title = excluded.title,
                options = excluded.options,
                answer = excluded.answer
            RETURNING id
            ",
        )
        .bind(i64::from(question.number()))
        .bind(question.title())
        .bind(encode_options(question.options())?)
        .bind(question.answer())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)
    }

    async fn question_by_number(&self, number: u32) -> Result<Option<Question>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, number, title, options, answer
            FROM questions WHERE number = ?1
            ",
        )
        .bind(i64::from(number))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        tracing::debug!(number, found = row.is_some(), "question lookup by number");
        Ok(map_optional_lossy(row, "question", map_question_row))
    }

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, number, title, options, answer
            FROM questions WHERE id = ?1
            ",
        )
        .bind(id_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(map_optional_lossy(row, "question", map_question_row))
    }

    async fn list_questions(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let offset = i64::from(page.max(1) - 1) * i64::from(per_page);
        let rows = sqlx::query(
            r"
            SELECT id, number, title, options, answer
            FROM questions
            ORDER BY number ASC
            LIMIT ?1 OFFSET ?2
            ",
        )
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(map_rows_lossy(&rows, "question", map_question_row))
    }

    async fn count_questions(&self) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM questions")
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?;
        u32_from_i64("count", row.try_get::<i64, _>("n").map_err(ser)?)
    }

    async fn next_number_after(&self, number: u32) -> Result<Option<u32>, StorageError> {
        let row = sqlx::query("SELECT MIN(number) AS n FROM questions WHERE number > ?1")
            .bind(i64::from(number))
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?;
        row.try_get::<Option<i64>, _>("n")
            .map_err(ser)?
            .map(|n| u32_from_i64("number", n))
            .transpose()
    }
}
