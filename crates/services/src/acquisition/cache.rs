use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use quiz_core::Clock;
use quiz_core::model::QuestionDraft;

use super::extractor::SourceShape;

/// Where cached pages live and how long they stay valid.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Age in days after which an entry is stale. `0` disables expiry.
    pub expire_days: u32,
    pub dir: PathBuf,
}

impl CacheConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            expire_days: 0,
            dir: PathBuf::new(),
        }
    }
}

/// Question types become part of a file name: ASCII letters, digits, `-` and `_` only.
#[must_use]
pub fn is_valid_question_type(question_type: &str) -> bool {
    !question_type.is_empty()
        && question_type
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Cache slot for one page of one question category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub question_type: String,
    pub page: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(question_type: impl Into<String>, page: u32) -> Self {
        Self {
            question_type: question_type.into(),
            page,
        }
    }

    /// `None` when the question type is not a plain selector.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        is_valid_question_type(&self.question_type)
            .then(|| format!("type_{}_page_{}.json", self.question_type, self.page))
    }

    /// Inverse of `file_name` for entries of `question_type`.
    fn page_from_file_name(question_type: &str, name: &str) -> Option<u32> {
        name.strip_prefix("type_")?
            .strip_prefix(question_type)?
            .strip_prefix("_page_")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}

/// File-per-page store of extracted drafts with mtime-based expiry.
///
/// Every failure is logged and reported as a miss; nothing here aborts a run.
#[derive(Debug, Clone)]
pub struct PageCache {
    config: CacheConfig,
    clock: Clock,
}

impl PageCache {
    #[must_use]
    pub fn new(config: CacheConfig, clock: Clock) -> Self {
        Self { config, clock }
    }

    /// Location of `key` inside the cache directory.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> Option<PathBuf> {
        match key.file_name() {
            Some(name) => Some(self.config.dir.join(name)),
            None => {
                tracing::warn!(question_type = %key.question_type, "question type unusable as a cache key");
                None
            }
        }
    }

    /// Cached drafts for `key`, or `None` when disabled, absent, stale or unreadable.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Vec<QuestionDraft>> {
        if !self.config.enabled {
            return None;
        }
        let path = self.path_for(key)?;
        if !path.exists() {
            return None;
        }
        if self.is_stale(&path) {
            tracing::debug!(page = key.page, path = %path.display(), "cache entry stale");
            return None;
        }
        let drafts = read_drafts(&path)?;
        // an empty page is never written, so treat one as a miss
        if drafts.is_empty() { None } else { Some(drafts) }
    }

    /// Overwrite the entry for `key`. Write failures are logged and dropped.
    pub fn put(&self, key: &CacheKey, drafts: &[QuestionDraft]) {
        if !self.config.enabled {
            return;
        }
        let Some(path) = self.path_for(key) else {
            return;
        };
        let result = fs::create_dir_all(&self.config.dir)
            .map_err(|e| e.to_string())
            .and_then(|()| serde_json::to_string_pretty(drafts).map_err(|e| e.to_string()))
            .and_then(|body| fs::write(&path, body).map_err(|e| e.to_string()));
        match result {
            Ok(()) => tracing::debug!(page = key.page, count = drafts.len(), "cached page"),
            Err(err) => tracing::warn!(page = key.page, path = %path.display(), %err, "cache write failed"),
        }
    }

    /// Recover `(total, page_size)` from fresh cached pages of `question_type`.
    ///
    /// Total is the highest question number seen, page size the longest page.
    #[must_use]
    pub fn scan_shape(&self, question_type: &str) -> Option<SourceShape> {
        if !self.config.enabled || !is_valid_question_type(question_type) {
            return None;
        }
        let entries = match fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(%err, "cache directory not readable");
                return None;
            }
        };

        let mut total = 0_u32;
        let mut page_size = 0_u32;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if CacheKey::page_from_file_name(question_type, name).is_none() {
                continue;
            }
            let path = entry.path();
            if self.is_stale(&path) {
                continue;
            }
            let Some(drafts) = read_drafts(&path) else {
                continue;
            };
            let len = u32::try_from(drafts.len()).unwrap_or(u32::MAX);
            page_size = page_size.max(len);
            if let Some(max) = drafts.iter().map(|d| d.number).max() {
                total = total.max(max);
            }
        }

        (total > 0 && page_size > 0).then_some(SourceShape { total, page_size })
    }

    fn is_stale(&self, path: &Path) -> bool {
        if self.config.expire_days == 0 {
            return false;
        }
        let Some(written_at) = modified_at(path) else {
            return true;
        };
        self.clock.age_of(written_at) > Duration::days(i64::from(self.config.expire_days))
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(at) => Some(DateTime::<Utc>::from(at)),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "cache entry has no modification time");
            None
        }
    }
}

fn read_drafts(path: &Path) -> Option<Vec<QuestionDraft>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "cache read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(drafts) => Some(drafts),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "corrupt cache entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(number: u32) -> QuestionDraft {
        QuestionDraft {
            number,
            title: format!("Question {number}"),
            options: vec!["yes".into(), "no".into()],
            answer: "yes".into(),
        }
    }

    fn cache_in(dir: &Path, expire_days: u32, clock: Clock) -> PageCache {
        PageCache::new(
            CacheConfig {
                enabled: true,
                expire_days,
                dir: dir.to_path_buf(),
            },
            clock,
        )
    }

    #[test]
    fn file_name_is_derived_from_type_and_page() {
        let key = CacheKey::new("A", 3);
        assert_eq!(key.file_name().as_deref(), Some("type_A_page_3.json"));
        assert_eq!(CacheKey::page_from_file_name("A", "type_A_page_3.json"), Some(3));
        assert_eq!(CacheKey::page_from_file_name("B", "type_A_page_3.json"), None);
    }

    #[test]
    fn path_like_question_types_never_touch_the_filesystem() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("cache");
        let cache = cache_in(&dir, 0, Clock::System);

        for bad in ["../A", "A/B", "..", "", "A B"] {
            assert!(!is_valid_question_type(bad), "{bad:?}");
            let key = CacheKey::new(bad, 1);
            assert!(key.file_name().is_none());
            cache.put(&key, &[draft(1)]);
            assert!(cache.get(&key).is_none());
            assert!(cache.scan_shape(bad).is_none());
        }
        assert!(!dir.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(is_valid_question_type("kind-2_b"));
    }

    #[test]
    fn put_then_get_returns_the_same_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), 7, Clock::System);
        let key = CacheKey::new("A", 1);

        assert!(cache.get(&key).is_none());
        cache.put(&key, &[draft(1), draft(2)]);
        assert_eq!(cache.get(&key).unwrap(), vec![draft(1), draft(2)]);
    }

    #[test]
    fn entries_expire_after_the_horizon() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("A", 1);
        cache_in(dir.path(), 7, Clock::System).put(&key, &[draft(1)]);

        let later = Clock::fixed(Utc::now() + Duration::days(8));
        assert!(cache_in(dir.path(), 7, later).get(&key).is_none());

        let soon = Clock::fixed(Utc::now() + Duration::days(6));
        assert!(cache_in(dir.path(), 7, soon).get(&key).is_some());
    }

    #[test]
    fn zero_horizon_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("A", 1);
        cache_in(dir.path(), 0, Clock::System).put(&key, &[draft(1)]);

        let far = Clock::fixed(Utc::now() + Duration::days(3650));
        assert!(cache_in(dir.path(), 0, far).get(&key).is_some());
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), 0, Clock::System);
        let key = CacheKey::new("A", 2);
        fs::write(cache.path_for(&key).unwrap(), "{not json").unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn disabled_cache_neither_reads_nor_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(
            CacheConfig {
                enabled: false,
                expire_days: 0,
                dir: dir.path().to_path_buf(),
            },
            Clock::System,
        );
        let key = CacheKey::new("A", 1);
        cache.put(&key, &[draft(1)]);
        assert!(!cache.path_for(&key).unwrap().exists());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn scan_shape_uses_max_number_and_longest_page() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), 0, Clock::System);
        cache.put(&CacheKey::new("A", 1), &(1..=10).map(draft).collect::<Vec<_>>());
        cache.put(&CacheKey::new("A", 3), &(21..=25).map(draft).collect::<Vec<_>>());
        cache.put(&CacheKey::new("B", 1), &(1..=40).map(draft).collect::<Vec<_>>());
        fs::write(dir.path().join("type_A_page_9.json"), "garbage").unwrap();

        let shape = cache.scan_shape("A").unwrap();
        assert_eq!(shape, SourceShape { total: 25, page_size: 10 });
        assert!(cache.scan_shape("C").is_none());
    }
}
