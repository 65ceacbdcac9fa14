use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question number must be at least 1")]
    InvalidNumber,

    #[error("question title is empty")]
    EmptyTitle,

    #[error("question has no options")]
    NoOptions,

    #[error("answer {answer:?} is not one of the options")]
    AnswerNotAnOption { answer: String },
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// A question as extracted from a source page, before validation.
///
/// This is also the shape written to page cache artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub number: u32,
    pub title: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl QuestionDraft {
    /// Validate the draft, trimming text fields.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the number is zero, the title is blank, there are
    /// no options, or the answer does not match any option.
    pub fn validate(self) -> Result<ValidatedQuestion, QuestionError> {
        let (number, title, options, answer) =
            normalize(self.number, self.title, self.options, self.answer)?;
        Ok(ValidatedQuestion {
            number,
            title,
            options,
            answer,
        })
    }
}

fn normalize(
    number: u32,
    title: String,
    options: Vec<String>,
    answer: String,
) -> Result<(u32, String, Vec<String>, String), QuestionError> {
    if number == 0 {
        return Err(QuestionError::InvalidNumber);
    }
    let title = title.trim().to_owned();
    if title.is_empty() {
        return Err(QuestionError::EmptyTitle);
    }
    let options: Vec<String> = options.into_iter().map(|o| o.trim().to_owned()).collect();
    if options.is_empty() {
        return Err(QuestionError::NoOptions);
    }
    let answer = answer.trim().to_owned();
    if !options.iter().any(|o| *o == answer) {
        return Err(QuestionError::AnswerNotAnOption { answer });
    }
    Ok((number, title, options, answer))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuestion {
    number: u32,
    title: String,
    options: Vec<String>,
    answer: String,
}

impl ValidatedQuestion {
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn assign_id(self, id: QuestionId) -> Question {
        Question {
            id,
            number: self.number,
            title: self.title,
            options: self.options,
            answer: self.answer,
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A persisted multiple-choice question. `answer` always equals one of `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    number: u32,
    title: String,
    options: Vec<String>,
    answer: String,
}

impl Question {
    /// Rehydrate a question from storage.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the stored row violates the question invariants.
    pub fn from_persisted(
        id: QuestionId,
        number: u32,
        title: String,
        options: Vec<String>,
        answer: String,
    ) -> Result<Self, QuestionError> {
        let (number, title, options, answer) = normalize(number, title, options, answer)?;
        Ok(Self {
            id,
            number,
            title,
            options,
            answer,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Options in stored order.
    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Index of the correct option in stored order.
    #[must_use]
    pub fn answer_index(&self) -> usize {
        // `normalize` guarantees the answer is present.
        self.options
            .iter()
            .position(|o| *o == self.answer)
            .unwrap_or_default()
    }

    /// Whether the option at `choice` (stored order) is correct.
    ///
    /// Returns `None` when `choice` is out of range.
    #[must_use]
    pub fn is_correct(&self, choice: usize) -> Option<bool> {
        self.options.get(choice).map(|o| *o == self.answer)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(answer: &str) -> QuestionDraft {
        QuestionDraft {
            number: 5,
            title: "  Which port does HTTPS use?  ".into(),
            options: vec!["80".into(), " 443 ".into(), "21".into()],
            answer: answer.into(),
        }
    }

    #[test]
    fn validate_trims_and_keeps_order() {
        let q = draft("443").validate().unwrap();
        assert_eq!(q.title(), "Which port does HTTPS use?");
        assert_eq!(q.options(), &["80", "443", "21"]);
        assert_eq!(q.answer(), "443");
    }

    #[test]
    fn validate_rejects_answer_outside_options() {
        let err = draft("8080").validate().unwrap_err();
        assert!(matches!(err, QuestionError::AnswerNotAnOption { .. }));
    }

    #[test]
    fn validate_rejects_zero_number_and_blank_title() {
        let mut d = draft("443");
        d.number = 0;
        assert_eq!(d.validate().unwrap_err(), QuestionError::InvalidNumber);

        let mut d = draft("443");
        d.title = "   ".into();
        assert_eq!(d.validate().unwrap_err(), QuestionError::EmptyTitle);

        let mut d = draft("443");
        d.options.clear();
        assert_eq!(d.validate().unwrap_err(), QuestionError::NoOptions);
    }

    #[test]
    fn answer_index_and_correctness_use_stored_order() {
        let q = draft("443").validate().unwrap().assign_id(QuestionId::new(9));
        assert_eq!(q.id(), QuestionId::new(9));
        assert_eq!(q.answer_index(), 1);
        assert_eq!(q.is_correct(1), Some(true));
        assert_eq!(q.is_correct(0), Some(false));
        assert_eq!(q.is_correct(3), None);
    }

    #[test]
    fn draft_serializes_as_plain_record() {
        let d = draft("443");
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"number\":5"));
        let back: QuestionDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
