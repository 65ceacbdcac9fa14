use serde::{Deserialize, Serialize};

/// Sequential position of a learner in the numbered question set.
///
/// Always at least 1. Not capped by the question count; callers compare against
/// the bank size when deciding whether a learner has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Progress(u32);

impl Progress {
    pub const START: Progress = Progress(1);

    /// Clamps `0` up to the starting position.
    #[must_use]
    pub fn at(number: u32) -> Self {
        Self(number.max(1))
    }

    #[must_use]
    pub fn current(self) -> u32 {
        self.0
    }

    /// Position after answering the question at `self`.
    #[must_use]
    pub fn advance(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// True once the position has moved past the last of `total` questions.
    #[must_use]
    pub fn is_past(self, total: u32) -> bool {
        self.0 > total
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::START
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_and_advances() {
        let p = Progress::default();
        assert_eq!(p.current(), 1);
        assert_eq!(p.advance().current(), 2);
    }

    #[test]
    fn zero_is_clamped_to_start() {
        assert_eq!(Progress::at(0), Progress::START);
    }

    #[test]
    fn is_past_detects_completion() {
        assert!(!Progress::at(25).is_past(25));
        assert!(Progress::at(26).is_past(25));
    }
}
