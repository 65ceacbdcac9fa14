use std::sync::Arc;
use std::time::Duration;

use storage::repository::Storage;

use crate::Clock;
use crate::acquisition::{
    AcquisitionPipeline, CacheConfig, Extractor, FetcherConfig, HttpFetcher, PageCache,
    PageSource, PipelineConfig, is_valid_question_type,
};
use crate::error::AppServicesError;
use crate::identity::IdentityService;
use crate::ingest::IngestService;
use crate::question_store::QuestionStore;
use crate::quiz::QuizService;

/// Everything needed to build an `IngestService` against the live source.
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub fetcher: FetcherConfig,
    pub cache: CacheConfig,
    pub delay: Duration,
}

/// Assembles learner-facing services over one `Storage` handle.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    store: QuestionStore,
    identity: Arc<IdentityService>,
    quiz: Arc<QuizService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// When `clear_database` is set every table is emptied first. The superadmin
    /// is seeded either way.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or seeding fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        superadmin: &str,
        clear_database: bool,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let services = Self::with_storage(storage, clock, superadmin);
        if clear_database {
            services.reset_store().await?;
        } else {
            services.identity.seed_superadmin().await?;
        }
        Ok(services)
    }

    /// Wire services over an existing storage bundle without seeding.
    #[must_use]
    pub fn with_storage(storage: Storage, clock: Clock, superadmin: &str) -> Self {
        let store = QuestionStore::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.maintenance),
        );
        let identity = Arc::new(IdentityService::new(
            clock,
            superadmin,
            Arc::clone(&storage.learners),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.wrong_answers),
        ));
        let quiz = Arc::new(QuizService::new(
            clock,
            store.clone(),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.wrong_answers),
        ));
        Self {
            clock,
            store,
            identity,
            quiz,
        }
    }

    /// Empty the store and seed the superadmin again.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the reset or the seeding fails.
    pub async fn reset_store(&self) -> Result<(), AppServicesError> {
        self.store.reset().await?;
        self.identity.seed_superadmin().await?;
        tracing::info!("question bank cleared");
        Ok(())
    }

    /// Ingest service fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` when the question type is unusable or the HTTP
    /// client or extractor cannot be built.
    pub fn http_ingest(
        &self,
        settings: AcquisitionSettings,
    ) -> Result<IngestService, AppServicesError> {
        let question_type = settings.fetcher.question_type.clone();
        if !is_valid_question_type(&question_type) {
            return Err(AppServicesError::InvalidQuestionType(question_type));
        }
        let fetcher = HttpFetcher::new(settings.fetcher)?;
        self.ingest_from(Arc::new(fetcher), settings.cache, question_type, settings.delay)
    }

    /// Ingest service over any page source.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::InvalidQuestionType` for a type that cannot
    /// name a cache file and `AppServicesError::Extractor` if the extractor
    /// cannot be built.
    pub fn ingest_from(
        &self,
        source: Arc<dyn PageSource>,
        cache: CacheConfig,
        question_type: String,
        delay: Duration,
    ) -> Result<IngestService, AppServicesError> {
        if !is_valid_question_type(&question_type) {
            return Err(AppServicesError::InvalidQuestionType(question_type));
        }
        let pipeline = AcquisitionPipeline::new(
            source,
            PageCache::new(cache, self.clock),
            Extractor::new()?,
            PipelineConfig {
                question_type,
                delay,
            },
        );
        Ok(IngestService::new(Arc::new(pipeline), self.store.clone()))
    }

    #[must_use]
    pub fn store(&self) -> QuestionStore {
        self.store.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Arc<IdentityService> {
        Arc::clone(&self.identity)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }
}
