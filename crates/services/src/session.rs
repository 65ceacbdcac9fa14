//! Transient learner state for callers without a registered handle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use quiz_core::model::{MissedQuestion, Question, QuestionId, SessionId};

#[derive(Debug, Clone)]
struct SessionMiss {
    count: u32,
    question: Question,
    last_review_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    current_number: Option<u32>,
    misses: BTreeMap<QuestionId, SessionMiss>,
}

/// Progress and misses of one anonymous session.
///
/// Clones share the same state, so one session can be handed to several services.
#[derive(Debug, Clone)]
pub struct AnonymousSession {
    id: SessionId,
    state: Arc<Mutex<SessionState>>,
}

impl Default for AnonymousSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AnonymousSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    // The state is plain data; a panic elsewhere cannot leave it half-updated.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn current_number(&self) -> Option<u32> {
        self.state().current_number
    }

    pub fn set_current_number(&self, number: u32) {
        self.state().current_number = Some(number);
    }

    /// Count one more miss of `question`, keeping a snapshot for review listings.
    pub fn record_miss(&self, question: &Question, at: DateTime<Utc>) -> u32 {
        let mut state = self.state();
        let entry = state
            .misses
            .entry(question.id())
            .and_modify(|m| {
                m.count = m.count.saturating_add(1);
                m.question = question.clone();
                m.last_review_time = at;
            })
            .or_insert_with(|| SessionMiss {
                count: 1,
                question: question.clone(),
                last_review_time: at,
            });
        entry.count
    }

    pub fn remove_miss(&self, question: QuestionId) -> bool {
        self.state().misses.remove(&question).is_some()
    }

    #[must_use]
    pub fn misses(&self) -> Vec<MissedQuestion> {
        self.state()
            .misses
            .values()
            .map(|m| MissedQuestion {
                question: m.question.clone(),
                wrong_count: m.count,
                last_review_time: m.last_review_time,
            })
            .collect()
    }

    #[must_use]
    pub fn miss_count(&self) -> usize {
        self.state().misses.len()
    }

    /// `(question, count)` pairs for replaying into a durable ledger.
    #[must_use]
    pub fn miss_counts(&self) -> Vec<(QuestionId, u32)> {
        self.state()
            .misses
            .iter()
            .map(|(id, m)| (*id, m.count))
            .collect()
    }

    /// Forget all transient state after it has been migrated.
    pub fn clear(&self) {
        let mut state = self.state();
        state.current_number = None;
        state.misses.clear();
    }
}
