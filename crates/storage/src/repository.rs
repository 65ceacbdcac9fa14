use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    Learner, LearnerId, MissedQuestion, Progress, Question, QuestionId, Role, ValidatedQuestion,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable question collection keyed by stable question number.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Insert a question or replace the one with the same number, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &ValidatedQuestion)
    -> Result<QuestionId, StorageError>;

    /// Fetch a question by its number.
    ///
    /// Malformed rows are reported as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn question_by_number(&self, number: u32) -> Result<Option<Question>, StorageError>;

    /// Fetch a question by id. Malformed rows are reported as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// One page of questions in ascending number order. `page` is 1-based.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn list_questions(&self, page: u32, per_page: u32)
    -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_questions(&self) -> Result<u32, StorageError>;

    /// Smallest stored number greater than `number`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn next_number_after(&self, number: u32) -> Result<Option<u32>, StorageError>;
}

#[async_trait]
pub trait LearnerRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn learner_by_handle(&self, handle: &str) -> Result<Option<Learner>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn learner_by_id(&self, id: LearnerId) -> Result<Option<Learner>, StorageError>;

    /// Return the learner with `handle`, creating it with `role` when absent.
    ///
    /// An existing learner keeps its stored role.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the learner cannot be stored or read back.
    async fn ensure_learner(
        &self,
        handle: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<Learner, StorageError>;

    /// All learners, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner does not exist.
    async fn set_role(&self, id: LearnerId, role: Role) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Create the progress row at the start position when absent and return the current value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner does not exist.
    async fn ensure_progress(&self, learner: LearnerId) -> Result<Progress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn progress(&self, learner: LearnerId) -> Result<Option<Progress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner does not exist.
    async fn set_progress(&self, learner: LearnerId, progress: Progress)
    -> Result<(), StorageError>;
}

/// Per-learner wrong-answer ledger joined with question content.
#[async_trait]
pub trait WrongAnswerRepository: Send + Sync {
    /// Insert an entry with count 1 or increment the existing one, as one atomic step.
    ///
    /// Returns the new `wrong_count`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner or question does not exist.
    async fn record_miss(
        &self,
        learner: LearnerId,
        question: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Add each `(question, count)` to the learner's ledger in one transaction.
    ///
    /// Pairs naming an unknown question or a zero count are left out. Returns the
    /// questions that were merged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner does not exist. Nothing is
    /// written when an error is returned.
    async fn merge_misses(
        &self,
        learner: LearnerId,
        misses: &[(QuestionId, u32)],
        at: DateTime<Utc>,
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// Delete the entry. Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn remove_miss(&self, learner: LearnerId, question: QuestionId)
    -> Result<bool, StorageError>;

    /// Entries ordered by `last_review_time desc, wrong_count desc`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn misses(&self, learner: LearnerId) -> Result<Vec<MissedQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn miss_count(&self, learner: LearnerId) -> Result<u32, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn miss_entry(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<MissedQuestion>, StorageError>;

    /// Smallest missed number above `current_number`, wrapping to the smallest overall.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn next_miss_after(
        &self,
        learner: LearnerId,
        current_number: u32,
    ) -> Result<Option<MissedQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn first_miss(&self, learner: LearnerId) -> Result<Option<MissedQuestion>, StorageError>;
}

#[async_trait]
pub trait StoreMaintenance: Send + Sync {
    /// Remove every question, learner, progress row and ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the reset cannot be completed.
    async fn reset_all(&self) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy)]
struct MissRecord {
    wrong_count: u32,
    last_review_time: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    questions: BTreeMap<QuestionId, Question>,
    question_numbers: HashMap<u32, QuestionId>,
    next_question_id: u64,
    learners: BTreeMap<LearnerId, Learner>,
    next_learner_id: u64,
    progress: HashMap<LearnerId, Progress>,
    misses: HashMap<(LearnerId, QuestionId), MissRecord>,
}

impl MemoryState {
    fn joined_misses(&self, learner: LearnerId) -> Vec<MissedQuestion> {
        self.misses
            .iter()
            .filter(|((owner, _), _)| *owner == learner)
            .filter_map(|((_, qid), record)| {
                self.questions.get(qid).map(|q| MissedQuestion {
                    question: q.clone(),
                    wrong_count: record.wrong_count,
                    last_review_time: record.last_review_time,
                })
            })
            .collect()
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(
        &self,
        question: &ValidatedQuestion,
    ) -> Result<QuestionId, StorageError> {
        let mut guard = self.lock()?;
        let existing = guard.question_numbers.get(&question.number()).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                guard.next_question_id += 1;
                let id = QuestionId::new(guard.next_question_id);
                guard.question_numbers.insert(question.number(), id);
                id
            }
        };
        guard.questions.insert(id, question.clone().assign_id(id));
        Ok(id)
    }

    async fn question_by_number(&self, number: u32) -> Result<Option<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .question_numbers
            .get(&number)
            .and_then(|id| guard.questions.get(id))
            .cloned())
    }

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.questions.get(&id).cloned())
    }

    async fn list_questions(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut all: Vec<&Question> = guard.questions.values().collect();
        all.sort_by_key(|q| q.number());
        let skip = usize::try_from(page.max(1) - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(usize::try_from(per_page).unwrap_or(usize::MAX));
        Ok(all
            .into_iter()
            .skip(skip)
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_questions(&self) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        u32::try_from(guard.questions.len())
            .map_err(|_| StorageError::Serialization("question count overflow".into()))
    }

    async fn next_number_after(&self, number: u32) -> Result<Option<u32>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .question_numbers
            .keys()
            .copied()
            .filter(|n| *n > number)
            .min())
    }
}

#[async_trait]
impl LearnerRepository for InMemoryRepository {
    async fn learner_by_handle(&self, handle: &str) -> Result<Option<Learner>, StorageError> {
        let guard = self.lock()?;
        let handle = handle.trim();
        Ok(guard
            .learners
            .values()
            .find(|l| l.handle() == handle)
            .cloned())
    }

    async fn learner_by_id(&self, id: LearnerId) -> Result<Option<Learner>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.learners.get(&id).cloned())
    }

    async fn ensure_learner(
        &self,
        handle: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<Learner, StorageError> {
        let mut guard = self.lock()?;
        let trimmed = handle.trim();
        if let Some(existing) = guard.learners.values().find(|l| l.handle() == trimmed) {
            return Ok(existing.clone());
        }
        guard.next_learner_id += 1;
        let id = LearnerId::new(guard.next_learner_id);
        let learner = Learner::new(id, trimmed, role, created_at)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.learners.insert(id, learner.clone());
        Ok(learner)
    }

    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let guard = self.lock()?;
        let mut learners: Vec<Learner> = guard.learners.values().cloned().collect();
        learners.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then(b.id().cmp(&a.id()))
        });
        Ok(learners)
    }

    async fn set_role(&self, id: LearnerId, role: Role) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let current = guard.learners.get(&id).ok_or(StorageError::NotFound)?;
        let updated = Learner::new(id, current.handle(), role, current.created_at())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.learners.insert(id, updated);
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn ensure_progress(&self, learner: LearnerId) -> Result<Progress, StorageError> {
        let mut guard = self.lock()?;
        if !guard.learners.contains_key(&learner) {
            return Err(StorageError::NotFound);
        }
        Ok(*guard.progress.entry(learner).or_default())
    }

    async fn progress(&self, learner: LearnerId) -> Result<Option<Progress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&learner).copied())
    }

    async fn set_progress(
        &self,
        learner: LearnerId,
        progress: Progress,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.learners.contains_key(&learner) {
            return Err(StorageError::NotFound);
        }
        guard.progress.insert(learner, progress);
        Ok(())
    }
}

#[async_trait]
impl WrongAnswerRepository for InMemoryRepository {
    async fn record_miss(
        &self,
        learner: LearnerId,
        question: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let mut guard = self.lock()?;
        if !guard.learners.contains_key(&learner) || !guard.questions.contains_key(&question) {
            return Err(StorageError::NotFound);
        }
        let record = guard
            .misses
            .entry((learner, question))
            .and_modify(|r| {
                r.wrong_count = r.wrong_count.saturating_add(1);
                r.last_review_time = at;
            })
            .or_insert(MissRecord {
                wrong_count: 1,
                last_review_time: at,
            });
        Ok(record.wrong_count)
    }

    async fn merge_misses(
        &self,
        learner: LearnerId,
        misses: &[(QuestionId, u32)],
        at: DateTime<Utc>,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let mut guard = self.lock()?;
        if !guard.learners.contains_key(&learner) {
            return Err(StorageError::NotFound);
        }
        let mut merged = Vec::with_capacity(misses.len());
        for &(question, count) in misses {
            if count == 0 || !guard.questions.contains_key(&question) {
                continue;
            }
            guard
                .misses
                .entry((learner, question))
                .and_modify(|r| {
                    r.wrong_count = r.wrong_count.saturating_add(count);
                    r.last_review_time = at;
                })
                .or_insert(MissRecord {
                    wrong_count: count,
                    last_review_time: at,
                });
            merged.push(question);
        }
        Ok(merged)
    }

    async fn remove_miss(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard.misses.remove(&(learner, question)).is_some())
    }

    async fn misses(&self, learner: LearnerId) -> Result<Vec<MissedQuestion>, StorageError> {
        let guard = self.lock()?;
        let mut entries = guard.joined_misses(learner);
        entries.sort_by(MissedQuestion::review_order);
        Ok(entries)
    }

    async fn miss_count(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        let count = guard.misses.keys().filter(|(owner, _)| *owner == learner).count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("miss count overflow".into()))
    }

    async fn miss_entry(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .joined_misses(learner)
            .into_iter()
            .find(|e| e.question.id() == question))
    }

    async fn next_miss_after(
        &self,
        learner: LearnerId,
        current_number: u32,
    ) -> Result<Option<MissedQuestion>, StorageError> {
        let guard = self.lock()?;
        let entries = guard.joined_misses(learner);
        Ok(MissedQuestion::next_after(&entries, current_number).cloned())
    }

    async fn first_miss(&self, learner: LearnerId) -> Result<Option<MissedQuestion>, StorageError> {
        let guard = self.lock()?;
        let entries = guard.joined_misses(learner);
        Ok(MissedQuestion::first(&entries).cloned())
    }
}

#[async_trait]
impl StoreMaintenance for InMemoryRepository {
    async fn reset_all(&self) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        *guard = MemoryState::default();
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub learners: Arc<dyn LearnerRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub wrong_answers: Arc<dyn WrongAnswerRepository>,
    pub maintenance: Arc<dyn StoreMaintenance>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Share one repository value across every trait object.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuestionRepository
            + LearnerRepository
            + ProgressRepository
            + WrongAnswerRepository
            + StoreMaintenance
            + Clone
            + 'static,
    {
        Self {
            questions: Arc::new(repo.clone()),
            learners: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            wrong_answers: Arc::new(repo.clone()),
            maintenance: Arc::new(repo),
        }
    }
}
