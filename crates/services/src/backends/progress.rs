use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::model::{LearnerId, Progress};
use storage::repository::{ProgressRepository, StorageError};

use crate::session::AnonymousSession;

/// Sequential position of one learner.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` when the position cannot be read.
    async fn current(&self) -> Result<Progress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the position cannot be written.
    async fn set(&self, progress: Progress) -> Result<(), StorageError>;

    /// Move to the question after `from` and return the new position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the position cannot be written.
    async fn advance(&self, from: u32) -> Result<Progress, StorageError> {
        let next = Progress::at(from).advance();
        self.set(next).await?;
        Ok(next)
    }
}

pub struct DurableProgress {
    repo: Arc<dyn ProgressRepository>,
    learner: LearnerId,
}

impl DurableProgress {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>, learner: LearnerId) -> Self {
        Self { repo, learner }
    }
}

#[async_trait]
impl ProgressBackend for DurableProgress {
    async fn current(&self) -> Result<Progress, StorageError> {
        self.repo.ensure_progress(self.learner).await
    }

    async fn set(&self, progress: Progress) -> Result<(), StorageError> {
        self.repo.set_progress(self.learner, progress).await
    }
}

pub struct SessionProgress {
    session: AnonymousSession,
}

impl SessionProgress {
    #[must_use]
    pub fn new(session: AnonymousSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ProgressBackend for SessionProgress {
    async fn current(&self) -> Result<Progress, StorageError> {
        Ok(self
            .session
            .current_number()
            .map_or(Progress::START, Progress::at))
    }

    async fn set(&self, progress: Progress) -> Result<(), StorageError> {
        self.session.set_current_number(progress.current());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::Role;
    use quiz_core::time::fixed_now;
    use storage::repository::Storage;

    #[tokio::test]
    async fn session_progress_starts_at_one_and_advances() {
        let session = AnonymousSession::new();
        let backend = SessionProgress::new(session.clone());
        assert_eq!(backend.current().await.unwrap(), Progress::START);

        let next = backend.advance(5).await.unwrap();
        assert_eq!(next.current(), 6);
        assert_eq!(session.current_number(), Some(6));
    }

    #[tokio::test]
    async fn durable_progress_repairs_missing_rows() {
        let storage = Storage::in_memory();
        let learner = storage
            .learners
            .ensure_learner("carol", Role::Member, fixed_now())
            .await
            .unwrap();
        let backend = DurableProgress::new(Arc::clone(&storage.progress), learner.id());

        assert_eq!(backend.current().await.unwrap().current(), 1);
        backend.set(Progress::at(12)).await.unwrap();
        assert_eq!(backend.current().await.unwrap().current(), 12);
    }
}
