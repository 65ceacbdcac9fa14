#![forbid(unsafe_code)]

pub mod acquisition;
pub mod app_services;
pub mod backends;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod question_store;
pub mod quiz;
pub mod session;

pub use quiz_core::Clock;

pub use app_services::{AcquisitionSettings, AppServices};
pub use error::{AppServicesError, FetchError, IdentityError, QuestionStoreError, QuizError};
pub use identity::{IdentityService, require_role};
pub use ingest::{IngestReport, IngestService};
pub use question_store::{PresentedQuestion, QuestionStore};
pub use quiz::{Identity, QuizService, QuizStep, SubmitOutcome, SubmitRequest, Terminal};
pub use session::AnonymousSession;
