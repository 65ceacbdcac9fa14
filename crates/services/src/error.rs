//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionError, QuestionId, Role};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::acquisition::extractor::ExtractorError;

/// Errors emitted by page sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
    #[error("source responded with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by `QuestionStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionStoreError {
    #[error(transparent)]
    Invalid(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),
    #[error("option {index} is out of range for a question with {options} options")]
    InvalidChoice { index: usize, options: usize },
    #[error("target {target} is outside 1..={total}")]
    InvalidTarget { target: u32, total: u32 },
    #[error(transparent)]
    Store(#[from] QuestionStoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `IdentityService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("handle must not be empty")]
    EmptyHandle,
    #[error("learner not found")]
    UnknownLearner,
    #[error("{required} role required")]
    Forbidden { required: Role },
    #[error("role {0} cannot be assigned")]
    RoleNotAssignable(Role),
    #[error("the superadmin cannot be demoted")]
    SuperadminImmutable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error("question type {0:?} must be ASCII letters, digits, '-' or '_'")]
    InvalidQuestionType(String),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(#[from] QuestionStoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
}
