use chrono::{DateTime, Utc};
use quiz_core::model::{Learner, LearnerId, MissedQuestion, Question, QuestionId, Role};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

/// Serialize an ordered option list as a JSON array.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_options(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

/// Parse a JSON array of strings written by `encode_options`.
///
/// # Errors
///
/// Returns `StorageError::Serialization` for anything that is not an array of strings.
pub fn decode_options(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn parse_role(s: &str) -> Result<Role, StorageError> {
    s.parse::<Role>()
        .map_err(|_| StorageError::Serialization(format!("invalid role: {s}")))
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let options: String = row.try_get("options").map_err(ser)?;
    Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        u32_from_i64("number", row.try_get::<i64, _>("number").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        decode_options(&options)?,
        row.try_get::<String, _>("answer").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_learner_row(row: &SqliteRow) -> Result<Learner, StorageError> {
    let role: String = row.try_get("role").map_err(ser)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;
    Learner::new(
        learner_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("handle").map_err(ser)?,
        parse_role(&role)?,
        created_at,
    )
    .map_err(ser)
}

/// Maps a `wrong_answers` row joined with its question (question columns unprefixed).
pub(crate) fn map_missed_row(row: &SqliteRow) -> Result<MissedQuestion, StorageError> {
    Ok(MissedQuestion {
        question: map_question_row(row)?,
        wrong_count: u32_from_i64(
            "wrong_count",
            row.try_get::<i64, _>("wrong_count").map_err(ser)?,
        )?,
        last_review_time: row.try_get("last_review_time").map_err(ser)?,
    })
}

/// Keep well-formed rows, logging and dropping the rest.
pub(crate) fn map_rows_lossy<T>(
    rows: &[SqliteRow],
    what: &'static str,
    map: impl Fn(&SqliteRow) -> Result<T, StorageError>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match map(row) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(%err, "skipping malformed {what} row");
                None
            }
        })
        .collect()
}

/// Single-row lookups report malformed rows as absent.
pub(crate) fn map_optional_lossy<T>(
    row: Option<SqliteRow>,
    what: &'static str,
    map: impl Fn(&SqliteRow) -> Result<T, StorageError>,
) -> Option<T> {
    let row = row?;
    match map(&row) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(%err, "treating malformed {what} row as missing");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_survive_encoding_with_quotes_and_commas() {
        let options = vec![
            "it's \"quoted\"".to_string(),
            "a, b, c".to_string(),
            "[brackets]".to_string(),
            "中文选项".to_string(),
        ];
        let raw = encode_options(&options).unwrap();
        assert_eq!(decode_options(&raw).unwrap(), options);
    }

    #[test]
    fn legacy_literal_lists_are_rejected() {
        assert!(decode_options("['a', 'b']").is_err());
        assert!(decode_options("{\"a\": 1}").is_err());
        assert!(decode_options("[1, 2]").is_err());
    }

    #[test]
    fn roles_parse_from_storage_strings() {
        assert_eq!(parse_role("superadmin").unwrap(), Role::Superadmin);
        assert!(parse_role("owner").is_err());
    }
}
