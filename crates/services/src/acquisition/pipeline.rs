use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::QuestionDraft;
use tracing::instrument;

use super::cache::{CacheKey, PageCache};
use super::extractor::{Extractor, SourceShape};
use super::fetcher::PageSource;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub question_type: String,
    /// Pause after every network fetch. Cache hits never wait.
    pub delay: Duration,
}

/// Sequential page walker: cache first, then fetch and extract.
pub struct AcquisitionPipeline {
    source: Arc<dyn PageSource>,
    cache: PageCache,
    extractor: Extractor,
    config: PipelineConfig,
}

impl AcquisitionPipeline {
    #[must_use]
    pub fn new(
        source: Arc<dyn PageSource>,
        cache: PageCache,
        extractor: Extractor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            cache,
            extractor,
            config,
        }
    }

    /// Walk every page of the source and return all drafts in page order.
    ///
    /// An empty first page ends the run with nothing; a later empty page ends it
    /// early and keeps what was gathered so far.
    #[instrument(skip(self), fields(question_type = %self.config.question_type))]
    pub async fn acquire_all(&self) -> Vec<QuestionDraft> {
        let mut discovered: Option<SourceShape> = None;

        let first = self.load_page(1, &mut discovered).await;
        if first.is_empty() {
            tracing::info!("first page yielded no questions; source unreachable or changed");
            return Vec::new();
        }

        let shape = discovered
            .or_else(|| self.cache.scan_shape(&self.config.question_type))
            .unwrap_or_default();
        let total_pages = shape.total_pages();
        tracing::debug!(
            total = shape.total,
            page_size = shape.page_size,
            total_pages,
            "source shape"
        );

        let mut all = first;
        for page in 2..=total_pages {
            let drafts = self.load_page(page, &mut discovered).await;
            if drafts.is_empty() {
                tracing::info!(page, "empty page; stopping early");
                break;
            }
            all.extend(drafts);
        }

        tracing::info!(questions = all.len(), total_pages, "acquisition finished");
        all
    }

    async fn load_page(&self, page: u32, discovered: &mut Option<SourceShape>) -> Vec<QuestionDraft> {
        let key = CacheKey::new(self.config.question_type.clone(), page);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(page, count = cached.len(), "page served from cache");
            return cached;
        }

        let drafts = match self.source.fetch(page).await {
            Ok(markup) => {
                let extract = self.extractor.extract(&markup);
                if discovered.is_none() {
                    *discovered = extract.shape();
                }
                extract.questions
            }
            Err(err) => {
                tracing::warn!(page, %err, "page fetch failed; retry by running acquisition again");
                Vec::new()
            }
        };

        if !drafts.is_empty() {
            self.cache.put(&key, &drafts);
        }
        tracing::debug!(page, count = drafts.len(), "page fetched");

        tokio::time::sleep(self.config.delay).await;
        drafts
    }
}
