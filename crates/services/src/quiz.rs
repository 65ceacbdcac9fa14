use std::sync::Arc;

use rand::rng;
use rand::seq::IndexedRandom;

use quiz_core::Clock;
use quiz_core::model::{Learner, MissedQuestion, Progress, QuestionId};
use storage::repository::{ProgressRepository, WrongAnswerRepository};

use crate::backends::{
    DurableLedger, DurableProgress, MissLedger, ProgressBackend, SessionLedger, SessionProgress,
};
use crate::error::QuizError;
use crate::question_store::{PresentedQuestion, QuestionStore};
use crate::session::AnonymousSession;

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

/// Who is answering: a registered learner or an anonymous session.
#[derive(Debug, Clone)]
pub enum Identity {
    Registered(Learner),
    Anonymous(AnonymousSession),
}

/// What the learner should see at their current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizStep {
    Question(PresentedQuestion),
    /// Position is beyond the last question.
    Finished { total: u32 },
    /// No questions have been acquired yet.
    EmptyBank,
    /// The bank has a gap at this number.
    Missing { number: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRequest {
    pub question_id: QuestionId,
    /// Index into the stored option order. See `PresentedQuestion::stored_index`.
    pub chosen_option_index: usize,
    /// Number the learner was on when answering. Defaults to 1 outside practice
    /// and to the question's own number in practice.
    pub current_number: Option<u32>,
    pub practice_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The last missed question was answered correctly.
    PracticeComplete,
    /// Sequential progress moved past the last question.
    BankComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub correct: bool,
    pub canonical_answer: String,
    pub next_number: Option<u32>,
    pub terminal: Option<Terminal>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Sequential quiz and practice flow over either identity mode.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    store: QuestionStore,
    progress: Arc<dyn ProgressRepository>,
    wrong_answers: Arc<dyn WrongAnswerRepository>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: QuestionStore,
        progress: Arc<dyn ProgressRepository>,
        wrong_answers: Arc<dyn WrongAnswerRepository>,
    ) -> Self {
        Self {
            clock,
            store,
            progress,
            wrong_answers,
        }
    }

    fn progress_for(&self, identity: &Identity) -> Box<dyn ProgressBackend> {
        match identity {
            Identity::Registered(learner) => Box::new(DurableProgress::new(
                Arc::clone(&self.progress),
                learner.id(),
            )),
            Identity::Anonymous(session) => Box::new(SessionProgress::new(session.clone())),
        }
    }

    fn ledger_for(&self, identity: &Identity) -> Box<dyn MissLedger> {
        match identity {
            Identity::Registered(learner) => Box::new(DurableLedger::new(
                self.clock,
                Arc::clone(&self.wrong_answers),
                learner.id(),
            )),
            Identity::Anonymous(session) => {
                Box::new(SessionLedger::new(self.clock, session.clone()))
            }
        }
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` on storage failures.
    pub async fn progress(&self, identity: &Identity) -> Result<Progress, QuizError> {
        Ok(self.progress_for(identity).current().await?)
    }

    /// The question at `requested`, or at the learner's position when `None`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` on storage failures.
    pub async fn current_question(
        &self,
        identity: &Identity,
        requested: Option<u32>,
    ) -> Result<QuizStep, QuizError> {
        let number = match requested {
            Some(number) => number,
            None => self.progress_for(identity).current().await?.current(),
        };

        if let Some(question) = self.store.get_by_number(number).await? {
            return Ok(QuizStep::Question(question));
        }

        let total = self.store.count().await?;
        if total == 0 {
            return Ok(QuizStep::EmptyBank);
        }
        if Progress::at(number).is_past(total) {
            return Ok(QuizStep::Finished { total });
        }
        tracing::warn!(number, total, "question missing from an otherwise populated bank");
        Ok(QuizStep::Missing { number })
    }

    /// Check an answer and move the learner on.
    ///
    /// Outside practice, a miss is recorded and progress advances either way.
    /// In practice, progress is untouched: a correct answer clears the entry and a
    /// miss counts again, and the next missed question is picked cyclically.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::QuestionNotFound` for unknown question ids and
    /// `QuizError::InvalidChoice` when the option index is out of range.
    pub async fn submit(
        &self,
        identity: &Identity,
        request: SubmitRequest,
    ) -> Result<SubmitOutcome, QuizError> {
        let question = self
            .store
            .stored(request.question_id)
            .await?
            .ok_or(QuizError::QuestionNotFound(request.question_id))?;
        let correct = question
            .is_correct(request.chosen_option_index)
            .ok_or(QuizError::InvalidChoice {
                index: request.chosen_option_index,
                options: question.options().len(),
            })?;
        let canonical_answer = question.answer().to_owned();
        let ledger = self.ledger_for(identity);

        if request.practice_mode {
            if correct {
                ledger.remove(question.id()).await?;
                if ledger.count().await? == 0 {
                    return Ok(SubmitOutcome {
                        correct,
                        canonical_answer,
                        next_number: None,
                        terminal: Some(Terminal::PracticeComplete),
                    });
                }
            } else {
                ledger.record_miss(&question).await?;
            }

            let current = request.current_number.unwrap_or(question.number());
            let mut next = ledger.next_after(current).await?;
            if next.is_none() && ledger.count().await? > 0 {
                next = ledger.first().await?;
            }
            return Ok(SubmitOutcome {
                correct,
                canonical_answer,
                next_number: next.map(|m| m.number()),
                terminal: None,
            });
        }

        if !correct {
            let count = ledger.record_miss(&question).await?;
            tracing::debug!(number = question.number(), count, "miss recorded");
        }
        let next = self
            .progress_for(identity)
            .advance(request.current_number.unwrap_or(Progress::START.current()))
            .await?;
        let total = self.store.count().await?;
        let terminal = next.is_past(total).then_some(Terminal::BankComplete);

        Ok(SubmitOutcome {
            correct,
            canonical_answer,
            next_number: Some(next.current()),
            terminal,
        })
    }

    /// Jump to `target`, which must lie within `1..=count()`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTarget` when `target` is out of range.
    pub async fn reset_progress(
        &self,
        identity: &Identity,
        target: u32,
    ) -> Result<Progress, QuizError> {
        let total = self.store.count().await?;
        if !(1..=total).contains(&target) {
            return Err(QuizError::InvalidTarget { target, total });
        }
        let progress = Progress::at(target);
        self.progress_for(identity).set(progress).await?;
        Ok(progress)
    }

    /// Move past a numbering gap at `number` to the next stored question.
    ///
    /// Returns the new position, or `None` (position unchanged) when nothing is
    /// stored above `number`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` on storage failures.
    pub async fn skip_gap(
        &self,
        identity: &Identity,
        number: u32,
    ) -> Result<Option<u32>, QuizError> {
        let Some(next) = self.store.next_number_after(number).await? else {
            return Ok(None);
        };
        self.progress_for(identity).set(Progress::at(next)).await?;
        Ok(Some(next))
    }

    /// First question of a practice run: `question_id` when given, otherwise a
    /// random missed question. `None` when there is nothing to practice.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::QuestionNotFound` for an unknown `question_id`.
    pub async fn practice_start(
        &self,
        identity: &Identity,
        question_id: Option<QuestionId>,
    ) -> Result<Option<PresentedQuestion>, QuizError> {
        if let Some(id) = question_id {
            let question = self
                .store
                .get_by_id(id)
                .await?
                .ok_or(QuizError::QuestionNotFound(id))?;
            return Ok(Some(question));
        }

        let misses = self.ledger_for(identity).list().await?;
        Ok(misses
            .choose(&mut rng())
            .map(|m| PresentedQuestion::shuffled(&m.question)))
    }

    /// Presented view of a practice question by number, if it is still missed.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` on storage failures.
    pub async fn practice_question(
        &self,
        identity: &Identity,
        number: u32,
    ) -> Result<Option<PresentedQuestion>, QuizError> {
        let misses = self.ledger_for(identity).list().await?;
        Ok(misses
            .iter()
            .find(|m| m.number() == number)
            .map(|m| PresentedQuestion::shuffled(&m.question)))
    }

    /// Missed questions, most recent and most frequent first.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` on storage failures.
    pub async fn review(&self, identity: &Identity) -> Result<Vec<MissedQuestion>, QuizError> {
        Ok(self.ledger_for(identity).list().await?)
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` on storage failures.
    pub async fn miss_entry(
        &self,
        identity: &Identity,
        question: QuestionId,
    ) -> Result<Option<MissedQuestion>, QuizError> {
        Ok(self.ledger_for(identity).entry(question).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionDraft;
    use quiz_core::time::fixed_clock;
    use storage::repository::Storage;

    async fn seeded(numbers: &[u32]) -> (QuizService, QuestionStore) {
        let storage = Storage::in_memory();
        let store = QuestionStore::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.maintenance),
        );
        for &n in numbers {
            store
                .upsert(QuestionDraft {
                    number: n,
                    title: format!("Q{n}"),
                    options: vec!["right".into(), "wrong".into()],
                    answer: "right".into(),
                })
                .await
                .unwrap();
        }
        let quiz = QuizService::new(
            fixed_clock(),
            store.clone(),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.wrong_answers),
        );
        (quiz, store)
    }

    async fn id_of(store: &QuestionStore, number: u32) -> QuestionId {
        store.get_by_number(number).await.unwrap().unwrap().id
    }

    fn answer(question_id: QuestionId, correct: bool, current: u32, practice: bool) -> SubmitRequest {
        SubmitRequest {
            question_id,
            chosen_option_index: usize::from(!correct),
            current_number: Some(current),
            practice_mode: practice,
        }
    }

    #[tokio::test]
    async fn steps_report_empty_finished_and_gaps() {
        let (quiz, _) = seeded(&[]).await;
        let anon = Identity::Anonymous(AnonymousSession::new());
        assert_eq!(quiz.current_question(&anon, None).await.unwrap(), QuizStep::EmptyBank);

        let (quiz, _) = seeded(&[1, 3]).await;
        assert!(matches!(
            quiz.current_question(&anon, None).await.unwrap(),
            QuizStep::Question(q) if q.number == 1
        ));
        assert_eq!(
            quiz.current_question(&anon, Some(2)).await.unwrap(),
            QuizStep::Missing { number: 2 }
        );
        assert!(matches!(
            quiz.current_question(&anon, Some(3)).await.unwrap(),
            QuizStep::Question(q) if q.number == 3
        ));
        // two questions stored, so position 4 is past the end
        assert_eq!(
            quiz.current_question(&anon, Some(4)).await.unwrap(),
            QuizStep::Finished { total: 2 }
        );
    }

    #[tokio::test]
    async fn gaps_are_skipped_to_the_next_stored_number() {
        let (quiz, _) = seeded(&[1, 2, 4]).await;
        let anon = Identity::Anonymous(AnonymousSession::new());

        assert_eq!(
            quiz.current_question(&anon, Some(3)).await.unwrap(),
            QuizStep::Missing { number: 3 }
        );
        assert_eq!(quiz.skip_gap(&anon, 3).await.unwrap(), Some(4));
        assert_eq!(quiz.progress(&anon).await.unwrap().current(), 4);
        assert!(matches!(
            quiz.current_question(&anon, None).await.unwrap(),
            QuizStep::Question(q) if q.number == 4
        ));

        assert_eq!(quiz.skip_gap(&anon, 4).await.unwrap(), None);
        assert_eq!(quiz.progress(&anon).await.unwrap().current(), 4);
    }

    #[tokio::test]
    async fn unknown_question_and_bad_choice_are_rejected() {
        let (quiz, store) = seeded(&[1]).await;
        let anon = Identity::Anonymous(AnonymousSession::new());

        let err = quiz
            .submit(&anon, answer(QuestionId::new(77), true, 1, false))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::QuestionNotFound(id) if id == QuestionId::new(77)));

        let mut request = answer(id_of(&store, 1).await, true, 1, false);
        request.chosen_option_index = 5;
        assert!(matches!(
            quiz.submit(&anon, request).await,
            Err(QuizError::InvalidChoice { index: 5, options: 2 })
        ));
    }

    #[tokio::test]
    async fn anonymous_practice_runs_on_the_session_ledger() {
        let (quiz, store) = seeded(&[3, 7, 10]).await;
        let session = AnonymousSession::new();
        let anon = Identity::Anonymous(session.clone());

        for n in [3, 7, 10] {
            let id = id_of(&store, n).await;
            quiz.submit(&anon, answer(id, false, n, false)).await.unwrap();
        }
        assert_eq!(session.current_number(), Some(11));

        let out = quiz
            .submit(&anon, answer(id_of(&store, 7).await, false, 7, true))
            .await
            .unwrap();
        assert_eq!(out.next_number, Some(10));
        assert_eq!(session.current_number(), Some(11));

        let out = quiz
            .submit(&anon, answer(id_of(&store, 10).await, true, 10, true))
            .await
            .unwrap();
        assert_eq!(out.next_number, Some(3));

        quiz.submit(&anon, answer(id_of(&store, 3).await, true, 3, true))
            .await
            .unwrap();
        let done = quiz
            .submit(&anon, answer(id_of(&store, 7).await, true, 7, true))
            .await
            .unwrap();
        assert_eq!(done.terminal, Some(Terminal::PracticeComplete));
        assert!(done.next_number.is_none());
        assert!(quiz.practice_start(&anon, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_answer_moves_past_the_bank() {
        let (quiz, store) = seeded(&[1, 2]).await;
        let anon = Identity::Anonymous(AnonymousSession::new());
        let out = quiz
            .submit(&anon, answer(id_of(&store, 2).await, true, 2, false))
            .await
            .unwrap();
        assert_eq!(out.next_number, Some(3));
        assert_eq!(out.terminal, Some(Terminal::BankComplete));
    }

    #[tokio::test]
    async fn reset_is_bounded_by_the_bank_size() {
        let (quiz, _) = seeded(&[1, 2, 3]).await;
        let anon = Identity::Anonymous(AnonymousSession::new());

        assert_eq!(quiz.reset_progress(&anon, 3).await.unwrap().current(), 3);
        assert_eq!(quiz.progress(&anon).await.unwrap().current(), 3);
        assert!(matches!(
            quiz.reset_progress(&anon, 4).await,
            Err(QuizError::InvalidTarget { target: 4, total: 3 })
        ));
        assert!(matches!(
            quiz.reset_progress(&anon, 0).await,
            Err(QuizError::InvalidTarget { target: 0, .. })
        ));
    }
}
