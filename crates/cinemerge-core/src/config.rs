use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::error::{Catalog, HarvestError};

const CONFIG_DIR_NAME: &str = "cinemerge";
const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_OMDB_BASE_URL: &str = "http://www.omdbapi.com/";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_PAGE_BUDGET: u32 = 100;
pub const DEFAULT_PACING_MS: u64 = 200;

/// What the run controller does when an upstream call fails for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run at the first unrecovered transport error.
    #[default]
    Abort,
    /// Count the item as failed and continue with the next one.
    Skip,
}

/// Base URL and credential for one upstream catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl CatalogEndpoint {
    /// Returns the key or a configuration error naming the variable to set.
    pub fn require_key(&self, catalog: Catalog) -> Result<&str, HarvestError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(HarvestError::Config(format!(
                "{} environment variable is not set",
                key_variable(catalog)
            ))),
        }
    }
}

fn key_variable(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Tmdb => "TMDB_API_KEY",
        Catalog::Omdb => "OMDB_API_KEY",
    }
}

/// Fully resolved settings handed to clients and the run controller.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub tmdb: CatalogEndpoint,
    pub omdb: CatalogEndpoint,
    pub language: String,
    pub page_budget: u32,
    pub pacing: Duration,
    pub policy: FailurePolicy,
    pub max_attempts: usize,
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            tmdb: CatalogEndpoint {
                base_url: DEFAULT_TMDB_BASE_URL.to_string(),
                api_key: None,
            },
            omdb: CatalogEndpoint {
                base_url: DEFAULT_OMDB_BASE_URL.to_string(),
                api_key: None,
            },
            language: DEFAULT_LANGUAGE.to_string(),
            page_budget: DEFAULT_PAGE_BUDGET,
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
            policy: FailurePolicy::Abort,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1_000),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// On-disk `config.toml` schema. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub tmdb_base_url: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub omdb_base_url: Option<String>,
    pub omdb_api_key: Option<String>,
    pub language: Option<String>,
    pub page_budget: Option<u32>,
    pub pacing_ms: Option<u64>,
    pub policy: Option<FailurePolicy>,
    pub max_attempts: Option<usize>,
    pub retry_backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Values supplied on the command line; applied last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub page_budget: Option<u32>,
    pub pacing_ms: Option<u64>,
    pub policy: Option<FailurePolicy>,
    pub max_attempts: Option<usize>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.page_budget.is_none()
            && self.pacing_ms.is_none()
            && self.policy.is_none()
            && self.max_attempts.is_none()
    }
}

impl HarvestConfig {
    /// Layer defaults, the TOML file, the environment and CLI overrides, in that order.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, HarvestError> {
        let file = match path {
            Some(path) => read_file_config(&expand_path(path))?,
            None => {
                let default_path = config_path();
                if default_path.exists() {
                    read_file_config(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let mut config = HarvestConfig::default();
        config.apply_file(file);
        config.apply_env()?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.tmdb_base_url {
            self.tmdb.base_url = url;
        }
        if file.tmdb_api_key.is_some() {
            self.tmdb.api_key = file.tmdb_api_key;
        }
        if let Some(url) = file.omdb_base_url {
            self.omdb.base_url = url;
        }
        if file.omdb_api_key.is_some() {
            self.omdb.api_key = file.omdb_api_key;
        }
        if let Some(language) = file.language {
            self.language = language;
        }
        if let Some(pages) = file.page_budget {
            self.page_budget = pages;
        }
        if let Some(ms) = file.pacing_ms {
            self.pacing = Duration::from_millis(ms);
        }
        if let Some(policy) = file.policy {
            self.policy = policy;
        }
        if let Some(attempts) = file.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(ms) = file.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = file.timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self) -> Result<(), HarvestError> {
        if let Ok(url) = env::var("TMDB_BASE_URL") {
            self.tmdb.base_url = url;
        }
        if let Ok(key) = env::var("TMDB_API_KEY") {
            self.tmdb.api_key = Some(key);
        }
        if let Ok(url) = env::var("OMDB_BASE_URL") {
            self.omdb.base_url = url;
        }
        if let Ok(key) = env::var("OMDB_API_KEY") {
            self.omdb.api_key = Some(key);
        }

        self.page_budget = parse_env("CINEMERGE_PAGE_BUDGET", self.page_budget, |s| {
            s.parse::<u32>()
        })?;
        let pacing_ms = parse_env(
            "CINEMERGE_PACING_MS",
            self.pacing.as_millis() as u64,
            |s| s.parse::<u64>(),
        )?;
        self.pacing = Duration::from_millis(pacing_ms);
        self.max_attempts = parse_env("CINEMERGE_MAX_ATTEMPTS", self.max_attempts, |s| {
            s.parse::<usize>()
        })?;
        let backoff_ms = parse_env(
            "CINEMERGE_RETRY_BACKOFF_MS",
            self.retry_backoff.as_millis() as u64,
            |s| s.parse::<u64>(),
        )?;
        self.retry_backoff = Duration::from_millis(backoff_ms);
        let timeout_secs = parse_env(
            "CINEMERGE_TIMEOUT_SECS",
            self.request_timeout.as_secs(),
            |s| s.parse::<u64>(),
        )?;
        self.request_timeout = Duration::from_secs(timeout_secs);
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(pages) = overrides.page_budget {
            self.page_budget = pages;
        }
        if let Some(ms) = overrides.pacing_ms {
            self.pacing = Duration::from_millis(ms);
        }
        if let Some(policy) = overrides.policy {
            self.policy = policy;
        }
        if let Some(attempts) = overrides.max_attempts {
            self.max_attempts = attempts;
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, HarvestError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        HarvestError::Config(format!("failed to read {}: {}", path.display(), err))
    })?;
    Ok(toml::from_str::<FileConfig>(&raw)?)
}

fn parse_env<T, F, E>(var: &str, default: T, mut parser: F) -> Result<T, HarvestError>
where
    F: FnMut(&str) -> Result<T, E>,
    E: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => match parser(value.trim()) {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(HarvestError::Config(format!(
                "invalid value for {}: {}",
                var, err
            ))),
        },
        Err(_) => Ok(default),
    }
}

/// Expand `~` and environment variables in user-supplied paths.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}
