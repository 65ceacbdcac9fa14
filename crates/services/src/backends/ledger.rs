use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::Clock;
use quiz_core::model::{LearnerId, MissedQuestion, Question, QuestionId};
use storage::repository::{StorageError, WrongAnswerRepository};

use crate::session::AnonymousSession;

/// Wrong-answer ledger of one learner.
#[async_trait]
pub trait MissLedger: Send + Sync {
    /// Count one more miss of `question` and return the new count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the miss cannot be recorded.
    async fn record_miss(&self, question: &Question) -> Result<u32, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the entry cannot be removed.
    async fn remove(&self, question: QuestionId) -> Result<bool, StorageError>;

    /// Entries, most recently and most often missed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the ledger cannot be read.
    async fn list(&self) -> Result<Vec<MissedQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the ledger cannot be read.
    async fn count(&self) -> Result<u32, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the ledger cannot be read.
    async fn entry(&self, question: QuestionId) -> Result<Option<MissedQuestion>, StorageError>;

    /// Cyclic successor of `current_number` among missed questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the ledger cannot be read.
    async fn next_after(&self, current_number: u32)
    -> Result<Option<MissedQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the ledger cannot be read.
    async fn first(&self) -> Result<Option<MissedQuestion>, StorageError>;
}

//
// ─── DURABLE ───────────────────────────────────────────────────────────────────
//

pub struct DurableLedger {
    clock: Clock,
    repo: Arc<dyn WrongAnswerRepository>,
    learner: LearnerId,
}

impl DurableLedger {
    #[must_use]
    pub fn new(clock: Clock, repo: Arc<dyn WrongAnswerRepository>, learner: LearnerId) -> Self {
        Self {
            clock,
            repo,
            learner,
        }
    }
}

#[async_trait]
impl MissLedger for DurableLedger {
    async fn record_miss(&self, question: &Question) -> Result<u32, StorageError> {
        self.repo
            .record_miss(self.learner, question.id(), self.clock.now())
            .await
    }

    async fn remove(&self, question: QuestionId) -> Result<bool, StorageError> {
        self.repo.remove_miss(self.learner, question).await
    }

    async fn list(&self) -> Result<Vec<MissedQuestion>, StorageError> {
        self.repo.misses(self.learner).await
    }

    async fn count(&self) -> Result<u32, StorageError> {
        self.repo.miss_count(self.learner).await
    }

    async fn entry(&self, question: QuestionId) -> Result<Option<MissedQuestion>, StorageError> {
        self.repo.miss_entry(self.learner, question).await
    }

    async fn next_after(
        &self,
        current_number: u32,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        self.repo.next_miss_after(self.learner, current_number).await
    }

    async fn first(&self) -> Result<Option<MissedQuestion>, StorageError> {
        self.repo.first_miss(self.learner).await
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

pub struct SessionLedger {
    clock: Clock,
    session: AnonymousSession,
}

impl SessionLedger {
    #[must_use]
    pub fn new(clock: Clock, session: AnonymousSession) -> Self {
        Self { clock, session }
    }
}

#[async_trait]
impl MissLedger for SessionLedger {
    async fn record_miss(&self, question: &Question) -> Result<u32, StorageError> {
        Ok(self.session.record_miss(question, self.clock.now()))
    }

    async fn remove(&self, question: QuestionId) -> Result<bool, StorageError> {
        Ok(self.session.remove_miss(question))
    }

    async fn list(&self) -> Result<Vec<MissedQuestion>, StorageError> {
        let mut entries = self.session.misses();
        entries.sort_by(MissedQuestion::review_order);
        Ok(entries)
    }

    async fn count(&self) -> Result<u32, StorageError> {
        u32::try_from(self.session.miss_count())
            .map_err(|_| StorageError::Serialization("miss count overflow".into()))
    }

    async fn entry(&self, question: QuestionId) -> Result<Option<MissedQuestion>, StorageError> {
        Ok(self
            .session
            .misses()
            .into_iter()
            .find(|m| m.question.id() == question))
    }

    async fn next_after(
        &self,
        current_number: u32,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        let entries = self.session.misses();
        Ok(MissedQuestion::next_after(&entries, current_number).cloned())
    }

    async fn first(&self) -> Result<Option<MissedQuestion>, StorageError> {
        let entries = self.session.misses();
        Ok(MissedQuestion::first(&entries).cloned())
    }
}
