#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, LearnerRepository, ProgressRepository, QuestionRepository, Storage,
    StorageError, StoreMaintenance, WrongAnswerRepository,
};
