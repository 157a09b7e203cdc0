//! CLI command implementations.

mod auth;
mod resources;

pub use auth::{login, logout, status, whoami};
pub use resources::{health, open, tracks};

use anyhow::{Context, Result};
use api_client::{ClientSettings, LogOnlyLauncher, RedirectLauncher, RequestClient, RetryPolicy};
use client_config_and_utils::{Config, Paths};
use session_auth::{AccessGuard, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Global options that shape how the client is built.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Overrides the configured API root.
    pub api_url: Option<String>,
    /// Overrides `~/.sessionctl`.
    pub base_dir: Option<PathBuf>,
    /// Print the login URL instead of opening a browser.
    pub no_browser: bool,
}

/// Load configuration from disk and the environment, then apply `options`.
pub fn load_config(options: &ClientOptions) -> Result<(Paths, Config)> {
    let paths = match &options.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => Paths::new()?,
    };

    let mut config = Config::load(&paths)
        .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;
    if let Some(url) = &options.api_url {
        config.api_base_url = url.clone();
    }
    config.validate()?;

    Ok((paths, config))
}

/// Translate configuration into client settings.
pub fn client_settings(config: &Config) -> Result<ClientSettings> {
    Ok(ClientSettings {
        base_url: config.api_base_url()?,
        request_timeout: config.request_timeout(),
        retry: RetryPolicy::new(config.max_retries, config.backoff_base()),
    })
}

/// Opens the login page in the default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserLauncher;

impl RedirectLauncher for BrowserLauncher {
    fn launch(&self, target: &str) -> std::result::Result<(), String> {
        println!("Opening {} in your browser...", target);
        ::open::that(target).map_err(|e| e.to_string())
    }
}

/// Everything a command needs to talk to the API.
pub struct AppContext {
    pub session: Arc<SessionManager>,
    pub guard: AccessGuard,
}

impl AppContext {
    /// Build the client from configuration and start the session check.
    pub fn connect(config: &Config, options: &ClientOptions) -> Result<Self> {
        let settings = client_settings(config)?;
        let launcher: Arc<dyn RedirectLauncher> = if options.no_browser {
            Arc::new(LogOnlyLauncher)
        } else {
            Arc::new(BrowserLauncher)
        };

        let client = RequestClient::from_settings(&settings, launcher)
            .context("Failed to build HTTP client")?;
        info!(api_url = %settings.base_url, "Client ready");

        Ok(Self::with_client(Arc::new(client), &config.login_route))
    }

    /// Start a session over an existing client.
    pub fn with_client(client: Arc<RequestClient>, login_route: &str) -> Self {
        let session = SessionManager::start(client);
        let guard = AccessGuard::new(session.clone(), login_route);
        debug!(login_route = %login_route, "Session started");
        Self { session, guard }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use api_client::testing::{MockTransport, RecordingLauncher};
    use url::Url;

    pub struct TestApp {
        pub mock: Arc<MockTransport>,
        pub launcher: Arc<RecordingLauncher>,
    }

    impl TestApp {
        pub fn new() -> Self {
            Self {
                mock: Arc::new(MockTransport::new()),
                launcher: Arc::new(RecordingLauncher::new()),
            }
        }

        /// Start a session; script the identity response before calling.
        pub fn context(&self) -> AppContext {
            let client = RequestClient::new(
                self.mock.clone(),
                Url::parse("http://localhost:8000/api/").unwrap(),
                RetryPolicy::default(),
                self.launcher.clone(),
            );
            AppContext::with_client(Arc::new(client), "/login")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_applies_api_url_override() {
        let dir = tempdir().unwrap();
        let options = ClientOptions {
            api_url: Some("https://music.example.com/api".to_string()),
            base_dir: Some(dir.path().to_path_buf()),
            no_browser: true,
        };

        let (paths, config) = load_config(&options).unwrap();
        assert_eq!(paths.base_dir(), &dir.path().to_path_buf());
        assert_eq!(config.api_base_url, "https://music.example.com/api");
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let options = ClientOptions {
            base_dir: Some(dir.path().to_path_buf()),
            ..ClientOptions::default()
        };

        let err = load_config(&options).unwrap_err();
        assert!(format!("{:#}", err).contains("config.json"));
    }

    #[test]
    fn test_client_settings_from_config() {
        let config = Config {
            api_base_url: "https://music.example.com/api".to_string(),
            max_retries: 4,
            backoff_base_ms: 500,
            ..Config::default()
        };

        let settings = client_settings(&config).unwrap();
        assert_eq!(settings.base_url.as_str(), "https://music.example.com/api/");
        assert_eq!(settings.retry.max_attempts(), 5);
        assert_eq!(settings.retry.delay_for_retry(2), Duration::from_secs(1));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }
}
