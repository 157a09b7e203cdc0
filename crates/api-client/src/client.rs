//! Typed operations over the retrying transport.

use crate::classifier::classify_decode_error;
use crate::error::{ApiClientError, ApiError, ApiResult, ErrorCode};
use crate::http::{HttpTransport, RawResponse, ReqwestTransport, RequestDescriptor};
use crate::transport::{RetryPolicy, RetryingTransport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Redirect-initiating login endpoint.
pub const LOGIN_PATH: &str = "auth/spotify-login";
/// Session identity endpoint.
pub const IDENTITY_PATH: &str = "auth/me";
pub const SAVED_TRACKS_PATH: &str = "saved-tracks";
pub const HEALTH_PATH: &str = "health";
/// Remote session invalidation. Servers without it are tolerated.
pub const LOGOUT_PATH: &str = "auth/logout";

/// Opens the external login page.
pub trait RedirectLauncher: Send + Sync {
    fn launch(&self, target: &str) -> Result<(), String>;
}

/// Launcher that only logs the target; used when no browser is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyLauncher;

impl RedirectLauncher for LogOnlyLauncher {
    fn launch(&self, target: &str) -> Result<(), String> {
        info!(target_url = %target, "Login redirect ready");
        Ok(())
    }
}

/// The identity behind the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserInfo {
    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// A saved track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct SavedTracksResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Settings needed to build a [`RequestClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API root; request paths are joined beneath it.
    pub base_url: Url,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Client for the handful of operations the application needs.
///
/// Shapes requests and unwraps responses. Retrying and classification are
/// left to [`RetryingTransport`]; nothing here retries.
#[derive(Clone)]
pub struct RequestClient {
    transport: RetryingTransport,
    base_url: Url,
    launcher: Arc<dyn RedirectLauncher>,
}

impl RequestClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: Url,
        retry: RetryPolicy,
        launcher: Arc<dyn RedirectLauncher>,
    ) -> Self {
        Self {
            transport: RetryingTransport::new(transport, retry),
            base_url,
            launcher,
        }
    }

    /// Build a client backed by [`ReqwestTransport`].
    pub fn from_settings(
        settings: &ClientSettings,
        launcher: Arc<dyn RedirectLauncher>,
    ) -> Result<Self, ApiClientError> {
        let http = ReqwestTransport::new(settings.base_url.clone(), settings.request_timeout)?;
        Ok(Self::new(
            Arc::new(http),
            settings.base_url.clone(),
            settings.retry.clone(),
            launcher,
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.policy()
    }

    /// Start the external login flow.
    ///
    /// The login endpoint answers with a redirect; its `Location` (resolved
    /// against the API root) is handed to the launcher. A response without
    /// one falls back to the endpoint URL itself. On error nothing is
    /// launched.
    pub async fn initiate_login(&self) -> ApiResult<()> {
        let response = self.transport.send(&RequestDescriptor::get(LOGIN_PATH)).await?;
        let target = self.redirect_target(&response);

        debug!(status = response.status(), "Login endpoint responded");
        self.launcher.launch(&target).map_err(|reason| {
            warn!(reason = %reason, "Failed to open login page");
            ApiError::new(ErrorCode::UnknownError, "Could not open login page")
                .with_details(Value::String(reason))
        })
    }

    fn redirect_target(&self, response: &RawResponse) -> String {
        let location = response
            .header("location")
            .filter(|_| response.is_redirect())
            .and_then(|location| self.base_url.join(location).ok());

        match location {
            Some(url) => url.to_string(),
            None => self
                .base_url
                .join(LOGIN_PATH)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| self.base_url.to_string()),
        }
    }

    /// The identity behind the current session cookie.
    pub async fn fetch_current_user(&self) -> ApiResult<UserInfo> {
        let user: UserInfo = self.fetch_resource(IDENTITY_PATH).await?;
        if user.id.trim().is_empty() {
            return Err(ApiError::new(
                ErrorCode::UnknownError,
                "Identity response is missing a user id",
            ));
        }
        Ok(user)
    }

    /// Authenticated JSON fetch. A 401 comes back as `HTTP_401`.
    pub async fn fetch_resource<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.transport.send(&RequestDescriptor::get(path)).await?;
        decode_success(&response)
    }

    pub async fn fetch_saved_tracks(&self) -> ApiResult<Vec<Track>> {
        let envelope: SavedTracksResponse = self.fetch_resource(SAVED_TRACKS_PATH).await?;
        Ok(envelope.tracks)
    }

    pub async fn health_check(&self) -> ApiResult<Value> {
        self.fetch_resource(HEALTH_PATH).await
    }

    /// Ask the server to drop the session.
    pub async fn logout(&self) -> ApiResult<()> {
        self.transport
            .send(&RequestDescriptor::post(LOGOUT_PATH))
            .await
            .map(|_| ())
    }
}

fn decode_success<T: DeserializeOwned>(response: &RawResponse) -> ApiResult<T> {
    if !response.is_success() {
        return Err(ApiError::new(
            ErrorCode::Http(response.status()),
            "Unexpected redirect",
        ));
    }
    response
        .decode()
        .map_err(|err| classify_decode_error(response, &err))
}
