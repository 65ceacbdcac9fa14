use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{Learner, LearnerId, Progress, Role, has_role};
use storage::repository::{LearnerRepository, ProgressRepository, WrongAnswerRepository};

use crate::error::IdentityError;
use crate::session::AnonymousSession;

/// Fail with `IdentityError::Forbidden` unless `learner` holds `required`.
///
/// # Errors
///
/// Returns `IdentityError::Forbidden` when the role is insufficient.
pub fn require_role(learner: &Learner, required: Role) -> Result<(), IdentityError> {
    if has_role(learner, required) {
        Ok(())
    } else {
        Err(IdentityError::Forbidden { required })
    }
}

/// Resolves handles to learners and folds anonymous state into them on login.
#[derive(Clone)]
pub struct IdentityService {
    clock: Clock,
    superadmin: String,
    learners: Arc<dyn LearnerRepository>,
    progress: Arc<dyn ProgressRepository>,
    wrong_answers: Arc<dyn WrongAnswerRepository>,
}

impl IdentityService {
    #[must_use]
    pub fn new(
        clock: Clock,
        superadmin: impl Into<String>,
        learners: Arc<dyn LearnerRepository>,
        progress: Arc<dyn ProgressRepository>,
        wrong_answers: Arc<dyn WrongAnswerRepository>,
    ) -> Self {
        Self {
            clock,
            superadmin: superadmin.into().trim().to_owned(),
            learners,
            progress,
            wrong_answers,
        }
    }

    /// Learner for `handle`, created as a member on first sight.
    ///
    /// The configured superadmin handle is created with the superadmin role. A
    /// missing progress row is recreated at the start position.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmptyHandle` for blank handles and
    /// `IdentityError::Storage` on storage failures.
    pub async fn resolve(&self, handle: &str) -> Result<Learner, IdentityError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(IdentityError::EmptyHandle);
        }
        let role = if handle == self.superadmin {
            Role::Superadmin
        } else {
            Role::Member
        };
        let learner = self
            .learners
            .ensure_learner(handle, role, self.clock.now())
            .await?;
        self.progress.ensure_progress(learner.id()).await?;
        Ok(learner)
    }

    /// Resolve `handle` and migrate the anonymous `session` into it.
    ///
    /// All transient misses are merged into the durable ledger in one
    /// transaction, keeping their counts. Transient progress (if any) then
    /// replaces the durable one. Each part leaves the session once it is
    /// written, so retrying after a failure never counts a miss twice.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` when resolution or a durable write fails. The
    /// session keeps whatever has not been written yet.
    pub async fn login(
        &self,
        handle: &str,
        session: &AnonymousSession,
    ) -> Result<Learner, IdentityError> {
        let learner = self.resolve(handle).await?;

        let transient = session.miss_counts();
        let merged = self
            .wrong_answers
            .merge_misses(learner.id(), &transient, self.clock.now())
            .await?;
        for (question, _) in &transient {
            if !merged.contains(question) {
                tracing::warn!(%question, "transient miss refers to a missing question; dropped");
            }
            session.remove_miss(*question);
        }

        let migrated_progress = session.current_number();
        if let Some(number) = migrated_progress {
            self.progress
                .set_progress(learner.id(), Progress::at(number))
                .await?;
        }

        session.clear();
        tracing::info!(
            learner = %learner.id(),
            session = %session.id(),
            merged = merged.len(),
            ?migrated_progress,
            "anonymous session migrated"
        );
        Ok(learner)
    }

    /// Create the superadmin learner, or restore its role if it was changed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Storage` on storage failures.
    pub async fn seed_superadmin(&self) -> Result<Learner, IdentityError> {
        if self.superadmin.is_empty() {
            return Err(IdentityError::EmptyHandle);
        }
        let mut learner = self
            .learners
            .ensure_learner(&self.superadmin, Role::Superadmin, self.clock.now())
            .await?;
        if learner.role() != Role::Superadmin {
            self.learners
                .set_role(learner.id(), Role::Superadmin)
                .await?;
            learner = self
                .learners
                .learner_by_id(learner.id())
                .await?
                .ok_or(IdentityError::UnknownLearner)?;
        }
        self.progress.ensure_progress(learner.id()).await?;
        Ok(learner)
    }

    /// All learners, newest first.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Storage` on storage failures.
    pub async fn list_learners(&self) -> Result<Vec<Learner>, IdentityError> {
        Ok(self.learners.list_learners().await?)
    }

    /// # Errors
    ///
    /// Returns `IdentityError::Storage` on storage failures.
    pub async fn find(&self, handle: &str) -> Result<Option<Learner>, IdentityError> {
        Ok(self.learners.learner_by_handle(handle).await?)
    }

    /// Change `target`'s role on behalf of `actor`.
    ///
    /// Only a superadmin may do this, only `member` and `admin` can be assigned,
    /// and the superadmin itself is never demoted.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Forbidden`, `RoleNotAssignable`,
    /// `SuperadminImmutable` or `UnknownLearner` when the change is not allowed.
    pub async fn set_role(
        &self,
        actor: &Learner,
        target: LearnerId,
        role: Role,
    ) -> Result<Learner, IdentityError> {
        require_role(actor, Role::Superadmin)?;
        if role == Role::Superadmin {
            return Err(IdentityError::RoleNotAssignable(role));
        }
        let current = self
            .learners
            .learner_by_id(target)
            .await?
            .ok_or(IdentityError::UnknownLearner)?;
        if current.role() == Role::Superadmin {
            return Err(IdentityError::SuperadminImmutable);
        }

        self.learners.set_role(target, role).await?;
        tracing::info!(actor = actor.handle(), target = current.handle(), %role, "role changed");
        self.learners
            .learner_by_id(target)
            .await?
            .ok_or(IdentityError::UnknownLearner)
    }
}
