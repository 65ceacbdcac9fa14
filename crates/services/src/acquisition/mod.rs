//! Paginated question acquisition: cache, fetch, extract, orchestrate.

pub mod cache;
pub mod extractor;
pub mod fetcher;
pub mod pipeline;

pub use cache::{CacheConfig, CacheKey, PageCache, is_valid_question_type};
pub use extractor::{DEFAULT_PAGE_SIZE, Extractor, ExtractorError, PageExtract, SourceShape};
pub use fetcher::{FetcherConfig, HttpFetcher, PageSource};
pub use pipeline::{AcquisitionPipeline, PipelineConfig};
