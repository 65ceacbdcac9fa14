use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::question::Question;

/// One wrong-answer ledger entry joined with its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedQuestion {
    pub question: Question,
    pub wrong_count: u32,
    pub last_review_time: DateTime<Utc>,
}

impl MissedQuestion {
    #[must_use]
    pub fn number(&self) -> u32 {
        self.question.number()
    }

    /// Listing order: most recently missed first, then most missed.
    #[must_use]
    pub fn review_order(a: &Self, b: &Self) -> Ordering {
        b.last_review_time
            .cmp(&a.last_review_time)
            .then(b.wrong_count.cmp(&a.wrong_count))
    }

    /// Cyclic successor of `current_number` among `entries`.
    ///
    /// Picks the smallest number strictly greater than `current_number`, wrapping to
    /// the smallest number overall when none is greater.
    #[must_use]
    pub fn next_after(entries: &[Self], current_number: u32) -> Option<&Self> {
        entries
            .iter()
            .filter(|e| e.number() > current_number)
            .min_by_key(|e| e.number())
            .or_else(|| Self::first(entries))
    }

    /// Entry with the smallest question number.
    #[must_use]
    pub fn first(entries: &[Self]) -> Option<&Self> {
        entries.iter().min_by_key(|e| e.number())
    }
}
