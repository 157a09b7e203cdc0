//! Resilient request client for the session API.
//!
//! This crate provides:
//! - Normalized [`ApiError`] records and the [`ApiResult`] alias
//! - An error classifier that never fails, whatever the server sent back
//! - A retrying transport with bounded exponential backoff for transient failures
//! - [`RequestClient`], the typed operations the application needs
//! - [`RequestTracker`], a `{data, loading, error}` view over one operation
//!
//! Nothing in this crate returns a raw transport fault: every operation
//! resolves to `ApiResult<T>`.

pub mod classifier;
mod client;
mod error;
mod http;
mod request_state;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use classifier::{classify, FailedOutcome};
pub use client::{
    Artist, ClientSettings, ExternalUrls, LogOnlyLauncher, RedirectLauncher, RequestClient,
    Track, UserInfo, HEALTH_PATH, IDENTITY_PATH, LOGIN_PATH, LOGOUT_PATH, SAVED_TRACKS_PATH,
};
pub use error::{
    ApiClientError, ApiError, ApiResult, ErrorCode, ParseErrorCodeError, TransportFailure,
};
pub use http::{HttpTransport, Method, RawResponse, ReqwestTransport, RequestDescriptor};
pub use request_state::{RequestState, RequestTracker};
pub use transport::{RetryContext, RetryPolicy, RetryingTransport};
