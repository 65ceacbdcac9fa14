//! `quizbank.toml` loading with environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use services::AcquisitionSettings;
use services::acquisition::{CacheConfig, FetcherConfig};

pub const DEFAULT_CONFIG_PATH: &str = "quizbank.toml";
/// Selects an `[environments.<name>]` profile.
pub const ENVIRONMENT_VAR: &str = "QUIZ_ENV";
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Top-level configuration. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_superadmin")]
    pub superadmin: String,
    /// Empty every table on startup and seed the superadmin again.
    #[serde(default)]
    pub clear_database: bool,
    /// Ask before `acquire` overwrites the bank.
    #[serde(default)]
    pub confirm_update: bool,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub questions: QuestionsSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Named overrides merged over the base values, see `ENVIRONMENT_VAR`.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentProfile>,
}

/// Per-environment overrides. Unset fields keep the base value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentProfile {
    /// `true` lowers the log level to `debug`.
    pub debug: Option<bool>,
    /// Overrides `cache.enabled`.
    pub use_cache: Option<bool>,
    pub confirm_update: Option<bool>,
    pub clear_database: Option<bool>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
    #[serde(default = "default_question_type")]
    pub question_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Days before a cached page is refetched. 0 keeps pages forever.
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionsSection {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
    /// Also write logs to `directory/file` when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_database_url() -> String {
    "sqlite:quizbank.sqlite3".to_string()
}
fn default_superadmin() -> String {
    "yangao".to_string()
}
fn default_request_timeout() -> u64 {
    10
}
fn default_delay() -> u64 {
    1
}
fn default_question_type() -> String {
    "A".to_string()
}
fn default_true() -> bool {
    true
}
fn default_expire_days() -> u32 {
    7
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_per_page() -> u32 {
    10
}
fn default_level() -> String {
    "info".to_string()
}
fn default_log_file() -> String {
    "quizbank.log".to_string()
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            superadmin: default_superadmin(),
            clear_database: false,
            confirm_update: false,
            scraper: ScraperConfig::default(),
            cache: CacheSection::default(),
            questions: QuestionsSection::default(),
            logging: LoggingSection::default(),
            environments: BTreeMap::new(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: BTreeMap::new(),
            request_timeout_secs: default_request_timeout(),
            delay_secs: default_delay(),
            question_type: default_question_type(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            expire_days: default_expire_days(),
            dir: default_cache_dir(),
        }
    }
}

impl Default for QuestionsSection {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            file: default_log_file(),
        }
    }
}

impl QuizConfig {
    /// Settings for an acquisition run.
    ///
    /// # Errors
    ///
    /// Fails when `scraper.base_url` is not configured.
    pub fn acquisition(&self) -> Result<AcquisitionSettings> {
        let base_url = self
            .scraper
            .base_url
            .clone()
            .context("scraper.base_url is required to acquire questions")?;
        Ok(AcquisitionSettings {
            fetcher: FetcherConfig {
                base_url,
                headers: self.scraper.headers.clone(),
                question_type: self.scraper.question_type.clone(),
                timeout: Duration::from_secs(self.scraper.request_timeout_secs),
            },
            cache: CacheConfig {
                enabled: self.cache.enabled,
                expire_days: self.cache.expire_days,
                dir: self.cache.dir.clone(),
            },
            delay: Duration::from_secs(self.scraper.delay_secs),
        })
    }

    /// Path of the log file, when file logging is configured.
    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging
            .directory
            .as_ref()
            .map(|dir| dir.join(&self.logging.file))
    }

    /// Merge the `name` profile over the base values. An unknown name changes nothing.
    fn apply_profile(&mut self, name: &str) {
        let Some(profile) = self.environments.get(name).cloned() else {
            return;
        };
        if profile.debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        if let Some(use_cache) = profile.use_cache {
            self.cache.enabled = use_cache;
        }
        if let Some(confirm) = profile.confirm_update {
            self.confirm_update = confirm;
        }
        if let Some(clear) = profile.clear_database {
            self.clear_database = clear;
        }
        if let Some(url) = profile.database_url {
            self.database_url = url;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let environment = lookup(ENVIRONMENT_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        self.apply_profile(environment.trim());

        if let Some(url) = lookup("QUIZ_DB_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = url;
        }
        if let Some(handle) = lookup("QUIZ_SUPERADMIN").filter(|v| !v.trim().is_empty()) {
            self.superadmin = handle;
        }
    }
}

/// Load from `path`, or from `quizbank.toml` when it exists, merge the profile
/// named by `QUIZ_ENV`, then apply `QUIZ_DB_URL` and `QUIZ_SUPERADMIN`.
///
/// # Errors
///
/// Fails when an explicit path is missing or any file does not parse.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizConfig> {
    let mut config = read_config(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn read_config(path: Option<&Path>) -> Result<QuizConfig> {
    let config_path = match path {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !local.exists() {
                return Ok(QuizConfig::default());
            }
            local
        }
    };

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", config_path.display()))
}
