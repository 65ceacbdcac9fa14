use std::sync::Arc;

use rand::rng;
use rand::seq::SliceRandom;

use quiz_core::model::{Question, QuestionDraft, QuestionId};
use storage::repository::{QuestionRepository, StoreMaintenance};

use crate::error::QuestionStoreError;

//
// ─── PRESENTED QUESTION ────────────────────────────────────────────────────────
//

/// A question as shown to a learner: options in a fresh random order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedQuestion {
    pub id: QuestionId,
    pub number: u32,
    pub title: String,
    pub options: Vec<String>,
    /// Index of the correct option inside `options`.
    pub answer_index: usize,
    /// `stored_order[i]` is the stored index of `options[i]`.
    stored_order: Vec<usize>,
}

impl PresentedQuestion {
    /// Present `question` with its options permuted by `order`.
    fn with_order(question: &Question, order: Vec<usize>) -> Self {
        let stored_answer = question.answer_index();
        let options = order
            .iter()
            .map(|&i| question.options()[i].clone())
            .collect();
        let answer_index = order
            .iter()
            .position(|&i| i == stored_answer)
            .unwrap_or_default();
        Self {
            id: question.id(),
            number: question.number(),
            title: question.title().to_owned(),
            options,
            answer_index,
            stored_order: order,
        }
    }

    #[must_use]
    pub fn shuffled(question: &Question) -> Self {
        let mut order: Vec<usize> = (0..question.options().len()).collect();
        order.shuffle(&mut rng());
        Self::with_order(question, order)
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.options[self.answer_index]
    }

    /// Map a choice in this view back to the stored option order.
    #[must_use]
    pub fn stored_index(&self, shuffled_index: usize) -> Option<usize> {
        self.stored_order.get(shuffled_index).copied()
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Question collection with per-read answer shuffling.
#[derive(Clone)]
pub struct QuestionStore {
    questions: Arc<dyn QuestionRepository>,
    maintenance: Arc<dyn StoreMaintenance>,
}

impl QuestionStore {
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionRepository>,
        maintenance: Arc<dyn StoreMaintenance>,
    ) -> Self {
        Self {
            questions,
            maintenance,
        }
    }

    /// Validate and insert, replacing any question with the same number.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError::Invalid` for drafts that break the question
    /// invariants and `QuestionStoreError::Storage` when the write fails.
    pub async fn upsert(&self, draft: QuestionDraft) -> Result<QuestionId, QuestionStoreError> {
        let question = draft.validate()?;
        Ok(self.questions.upsert_question(&question).await?)
    }

    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn get_by_number(
        &self,
        number: u32,
    ) -> Result<Option<PresentedQuestion>, QuestionStoreError> {
        let question = self.questions.question_by_number(number).await?;
        Ok(question.as_ref().map(PresentedQuestion::shuffled))
    }

    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn get_by_id(
        &self,
        id: QuestionId,
    ) -> Result<Option<PresentedQuestion>, QuestionStoreError> {
        let question = self.questions.question_by_id(id).await?;
        Ok(question.as_ref().map(PresentedQuestion::shuffled))
    }

    /// The stored question without shuffling, for answer checking.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn stored(&self, id: QuestionId) -> Result<Option<Question>, QuestionStoreError> {
        Ok(self.questions.question_by_id(id).await?)
    }

    /// One listing page in number order, options as stored.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn list(&self, page: u32, per_page: u32) -> Result<Vec<Question>, QuestionStoreError> {
        Ok(self.questions.list_questions(page, per_page).await?)
    }

    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn count(&self) -> Result<u32, QuestionStoreError> {
        Ok(self.questions.count_questions().await?)
    }

    /// Smallest stored number above `number`, skipping any gap.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` on storage failures.
    pub async fn next_number_after(&self, number: u32) -> Result<Option<u32>, QuestionStoreError> {
        Ok(self.questions.next_number_after(number).await?)
    }

    /// Drop every question together with all learner state.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError::Storage` when the reset fails.
    pub async fn reset(&self) -> Result<(), QuestionStoreError> {
        self.maintenance.reset_all().await?;
        Ok(())
    }
}
