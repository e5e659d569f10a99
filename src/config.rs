use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::logging::{LogFormat, LogLevel};
use crate::query::{IssueQuery, DEFAULT_PAGE_SIZE};

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_project_key")]
    pub project_key: String,
    #[serde(default)]
    pub query_filter: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            api_token: String::new(),
            project_key: default_project_key(),
            query_filter: None,
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
    #[serde(default = "default_metrics_log_interval_secs")]
    pub log_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: default_metrics_listen(),
            path: default_metrics_path(),
            prefix: default_metrics_prefix(),
            log_interval_secs: default_metrics_log_interval_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn effective_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else {
            self.level
        }
    }
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub jira_base_url: Option<String>,
    pub jira_username: Option<String>,
    pub jira_api_token: Option<String>,
    pub jira_project_key: Option<String>,
    pub jira_query_filter: Option<String>,
    pub jira_page_size: Option<usize>,
    pub refresh_interval_secs: Option<u64>,
    pub metrics_listen: Option<String>,
    pub metrics_path: Option<String>,
    pub metrics_prefix: Option<String>,
    pub logging_debug: Option<bool>,
    pub logging_level: Option<LogLevel>,
    pub logging_format: Option<LogFormat>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    MissingConfigFile { path: PathBuf },
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from(path);
    }
    match resolve_config_path() {
        Some(path) if path.exists() => load_from(&path),
        _ => Ok(AppConfig::default()),
    }
}

pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let path = path.to_path_buf();
    let raw = std::fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingConfigFile { path: path.clone() }
        } else {
            ConfigError::ReadFailed {
                path: path.clone(),
                source,
            }
        }
    })?;

    let cfg = toml::from_str::<AppConfig>(&raw).map_err(|source| ConfigError::ParseFailed {
        path: path.clone(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn resolve_config_path() -> Option<PathBuf> {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME");
    let home = std::env::var_os("HOME");
    resolve_config_path_from_env(xdg_config_home, home)
}

fn resolve_config_path_from_env(
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Option<PathBuf> {
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(dir).join("aim").join("config.toml"));
    }

    let home = home.filter(|value| !value.is_empty())?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("aim")
            .join("config.toml"),
    )
}

impl AppConfig {
    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) -> Result<(), ConfigError> {
        if let Some(value) = &overrides.jira_base_url {
            self.jira.base_url = value.clone();
        }
        if let Some(value) = &overrides.jira_username {
            self.jira.username = value.clone();
        }
        if let Some(value) = &overrides.jira_api_token {
            self.jira.api_token = value.clone();
        }
        if let Some(value) = &overrides.jira_project_key {
            self.jira.project_key = value.clone();
        }
        if let Some(value) = &overrides.jira_query_filter {
            self.jira.query_filter = Some(value.clone());
        }
        if let Some(value) = overrides.jira_page_size {
            self.jira.page_size = value;
        }
        if let Some(value) = overrides.refresh_interval_secs {
            self.refresh.interval_secs = value;
        }
        if let Some(value) = &overrides.metrics_listen {
            self.metrics.listen = value.clone();
        }
        if let Some(value) = &overrides.metrics_path {
            self.metrics.path = value.clone();
        }
        if let Some(value) = &overrides.metrics_prefix {
            self.metrics.prefix = value.clone();
        }
        if let Some(value) = overrides.logging_debug {
            self.logging.debug = value;
        }
        if let Some(value) = overrides.logging_level {
            self.logging.level = value;
        }
        if let Some(value) = overrides.logging_format {
            self.logging.format = value;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.project_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.project_key must not be empty".into(),
            ));
        }
        if self.jira.page_size == 0 {
            return Err(ConfigError::Invalid("jira.page_size must be > 0".into()));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh.interval_secs must be > 0".into(),
            ));
        }
        if !self.metrics.listen.trim().is_empty() && !self.metrics.path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "metrics.path must start with '/'".into(),
            ));
        }
        if self.metrics.log_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "metrics.log_interval_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.jira.base_url.trim().is_empty() {
            problems.push("jira url is not configured".to_string());
        }
        if self.jira.username.trim().is_empty() || self.jira.api_token.trim().is_empty() {
            problems.push("jira credentials are not configured".to_string());
        }
        problems
    }

    pub fn issue_query(&self) -> IssueQuery {
        IssueQuery::new(self.jira.project_key.trim())
            .with_filter(self.jira.query_filter.clone())
            .with_page_size(self.jira.page_size)
    }
}

fn default_project_key() -> String {
    "INCI".to_string()
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

const fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_metrics_listen() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_metrics_prefix() -> String {
    "aim".to_string()
}

const fn default_metrics_log_interval_secs() -> u64 {
    60
}
