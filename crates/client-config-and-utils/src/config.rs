//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default API root. Every request path is resolved relative to it.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry; doubles for each further retry.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;

/// Default route unauthenticated users are redirected to.
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

const ENV_LOG_LEVEL: &str = "SESSIONCTL_LOG_LEVEL";
const ENV_API_URL: &str = "SESSIONCTL_API_URL";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// API root URL, e.g. `https://example.com/api`.
    pub api_base_url: String,
    /// Timeout applied to each individual attempt.
    pub request_timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Route used as the redirect target for protected views.
    pub login_route: String,
    /// Optional JSONL log file.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file if it exists, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config file");
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the environment in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            debug!(key = ENV_LOG_LEVEL, value = %level, "Config override from environment");
            self.log_level = level;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            debug!(key = ENV_API_URL, value = %url.trim(), "Config override from environment");
            self.api_base_url = url.trim().to_string();
        }
    }

    /// Reject values the client cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.login_route.starts_with('/') {
            return Err(CoreError::Config(format!(
                "login_route must be an absolute path, got {:?}",
                self.login_route
            )));
        }
        Ok(())
    }

    /// The API root as a URL ending in `/`, so relative paths join beneath it.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let mut url = Url::parse(&self.api_base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_base(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.login_route, "/login");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "api_base_url": "https://music.example.com/api" }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_base_url, "https://music.example.com/api");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            max_retries: 4,
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.login_route, DEFAULT_LOGIN_ROUTE);
    }

    #[test]
    fn test_overrides_replace_level_and_url() {
        let vars: HashMap<&str, &str> = [
            (ENV_LOG_LEVEL, "warn"),
            (ENV_API_URL, " https://staging.example.com/api "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.api_base_url, "https://staging.example.com/api");
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_api_base_url_gets_trailing_slash() {
        let config = Config::default();
        let url = config.api_base_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/");
        assert_eq!(url.join("auth/me").unwrap().path(), "/api/auth/me");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = Config {
            api_base_url: "not a valid url".to_string(),
            ..Config::default()
        };
        assert!(matches!(bad_url.validate(), Err(CoreError::InvalidUrl(_))));

        let zero_timeout = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(zero_timeout.validate(), Err(CoreError::Config(_))));

        let relative_route = Config {
            login_route: "login".to_string(),
            ..Config::default()
        };
        assert!(matches!(relative_route.validate(), Err(CoreError::Config(_))));
    }
}
