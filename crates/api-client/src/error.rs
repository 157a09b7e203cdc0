//! Error types for the request client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Normalized error code.
///
/// Renders as `HTTP_<status>` for responses with a status, or as one of the
/// fixed names for failures without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ErrorCode {
    /// A response was received with this (non-success) status.
    Http(u16),
    /// No response: connection refused, DNS failure, other I/O trouble.
    NetworkError,
    /// Anything that could not be classified, including panics.
    UnknownError,
    /// The attempt timed out.
    Timeout,
    /// The connection was reset mid-request.
    ConnectionReset,
    /// A fault outside the client, caught at the application boundary.
    AppError,
}

impl ErrorCode {
    /// The HTTP status, when this code came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ErrorCode::Http(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Http(status) => write!(f, "HTTP_{}", status),
            ErrorCode::NetworkError => f.write_str("NETWORK_ERROR"),
            ErrorCode::UnknownError => f.write_str("UNKNOWN_ERROR"),
            ErrorCode::Timeout => f.write_str("TIMEOUT"),
            ErrorCode::ConnectionReset => f.write_str("CONNECTION_RESET"),
            ErrorCode::AppError => f.write_str("APP_ERROR"),
        }
    }
}

/// Returned when a string is not a known error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error code: {0}")]
pub struct ParseErrorCodeError(pub String);

impl FromStr for ErrorCode {
    type Err = ParseErrorCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NETWORK_ERROR" => Ok(ErrorCode::NetworkError),
            "UNKNOWN_ERROR" => Ok(ErrorCode::UnknownError),
            "TIMEOUT" => Ok(ErrorCode::Timeout),
            "CONNECTION_RESET" => Ok(ErrorCode::ConnectionReset),
            "APP_ERROR" => Ok(ErrorCode::AppError),
            other => other
                .strip_prefix("HTTP_")
                .and_then(|status| status.parse::<u16>().ok())
                .map(ErrorCode::Http)
                .ok_or_else(|| ParseErrorCodeError(other.to_string())),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.to_string()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = ParseErrorCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Normalized API error.
///
/// Built by the classifier (or the request-state tracker for panics) and
/// never modified afterwards; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Message used when a call fails in a way nothing anticipated.
pub(crate) const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details. A JSON `null` is treated as absent.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = (!details.is_null()).then_some(details);
        self
    }

    /// `UNKNOWN_ERROR` for a fault that was never supposed to happen.
    pub fn unexpected() -> Self {
        Self::new(ErrorCode::UnknownError, UNEXPECTED_ERROR_MESSAGE)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.code.status()
    }

    /// True for `HTTP_401`: the session is gone, not a generic failure.
    pub fn is_session_invalid(&self) -> bool {
        self.code == ErrorCode::Http(401)
    }

    /// True for the failure kinds the transport retries automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Http(429)
                | ErrorCode::Http(503)
                | ErrorCode::Timeout
                | ErrorCode::ConnectionReset
        )
    }

    /// Text suitable for showing to a person.
    pub fn user_message(&self) -> &str {
        match self.code {
            ErrorCode::Http(401) => "Your session has expired. Please log in again.",
            ErrorCode::Http(429) => "Too many requests. Please try again later.",
            ErrorCode::NetworkError => "Network error. Please check your connection.",
            _ => &self.message,
        }
    }
}

/// Result type for every request-client operation.
pub type ApiResult<T> = Result<T, ApiError>;

/// A failure where no response was received.
///
/// This is the raw input to the classifier; it never leaves the transport
/// layer on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The peer reset or aborted the connection.
    #[error("connection reset")]
    ConnectionReset,

    /// Could not connect (refused, DNS, TLS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Other I/O failure while sending or reading the body.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request could not be built at all.
    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportFailure {
    /// Returns true if retrying the identical request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportFailure::Timeout | TransportFailure::ConnectionReset)
    }
}

/// Errors raised while constructing a client (never while using one).
#[derive(Error, Debug)]
pub enum ApiClientError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Base URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
