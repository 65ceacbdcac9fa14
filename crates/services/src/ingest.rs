use std::sync::Arc;

use quiz_core::model::QuestionDraft;

use crate::acquisition::AcquisitionPipeline;
use crate::question_store::QuestionStore;

/// Tally of one acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub ingested: usize,
    pub skipped: usize,
}

/// Runs the acquisition pipeline and upserts what it returns.
#[derive(Clone)]
pub struct IngestService {
    pipeline: Arc<AcquisitionPipeline>,
    store: QuestionStore,
}

impl IngestService {
    #[must_use]
    pub fn new(pipeline: Arc<AcquisitionPipeline>, store: QuestionStore) -> Self {
        Self { pipeline, store }
    }

    pub async fn acquire_and_ingest(&self) -> IngestReport {
        let drafts = self.pipeline.acquire_all().await;
        self.ingest(drafts).await
    }

    /// Upsert each draft; invalid drafts and failed writes are logged and skipped.
    pub async fn ingest(&self, drafts: Vec<QuestionDraft>) -> IngestReport {
        let mut report = IngestReport {
            fetched: drafts.len(),
            ..IngestReport::default()
        };
        for draft in drafts {
            let number = draft.number;
            match self.store.upsert(draft).await {
                Ok(_) => report.ingested += 1,
                Err(err) => {
                    tracing::warn!(number, %err, "skipping question");
                    report.skipped += 1;
                }
            }
        }
        tracing::info!(
            fetched = report.fetched,
            ingested = report.ingested,
            skipped = report.skipped,
            "ingest finished"
        );
        report
    }
}
