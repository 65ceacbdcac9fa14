mod ids;
mod learner;
mod ledger;
mod progress;
mod question;

pub use ids::{LearnerId, ParseIdError, QuestionId, SessionId};

pub use learner::{Learner, Role, RoleError, has_role};
pub use ledger::MissedQuestion;
pub use progress::Progress;
pub use question::{Question, QuestionDraft, QuestionError, ValidatedQuestion};
