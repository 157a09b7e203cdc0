//! Maps failed outcomes onto normalized [`ApiError`]s.
//!
//! Every function here is total: malformed, empty, or non-JSON bodies still
//! produce a valid error with fallback text.

use crate::error::{ApiError, ErrorCode, TransportFailure};
use crate::http::RawResponse;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Message used when an error response carries no usable `message`.
pub const RESPONSE_FALLBACK_MESSAGE: &str = "An error occurred";

/// Message used when a network failure has no description.
pub const NETWORK_FALLBACK_MESSAGE: &str = "Network error occurred";

/// The outcome of an attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedOutcome {
    /// A response arrived with an error status.
    Response(RawResponse),
    /// No response arrived.
    Transport(TransportFailure),
}

/// Classify a failed outcome.
pub fn classify(outcome: &FailedOutcome) -> ApiError {
    match outcome {
        FailedOutcome::Response(response) => classify_response(response),
        FailedOutcome::Transport(failure) => classify_failure(failure),
    }
}

/// `HTTP_<status>` with the body's `message` and `details` when present.
pub fn classify_response(response: &RawResponse) -> ApiError {
    debug!(
        status = response.status(),
        body = %summarize_body(response.body()),
        "Classifying error response"
    );
    let envelope = serde_json::from_slice::<Value>(response.body()).ok();
    let envelope = envelope.as_ref().and_then(Value::as_object);

    let message = envelope
        .and_then(|body| body.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or(RESPONSE_FALLBACK_MESSAGE);

    let error = ApiError::new(ErrorCode::Http(response.status()), message);
    match envelope.and_then(|body| body.get("details")) {
        Some(details) => error.with_details(details.clone()),
        None => error,
    }
}

/// Classify a failure where no response was received.
pub fn classify_failure(failure: &TransportFailure) -> ApiError {
    let (code, detail) = match failure {
        TransportFailure::Timeout => (ErrorCode::Timeout, None),
        TransportFailure::ConnectionReset => (ErrorCode::ConnectionReset, None),
        TransportFailure::Connect(detail) | TransportFailure::Io(detail) => {
            (ErrorCode::NetworkError, Some(detail))
        }
        TransportFailure::Request(detail) => (ErrorCode::UnknownError, Some(detail)),
    };

    let message = match detail {
        Some(detail) if detail.trim().is_empty() => NETWORK_FALLBACK_MESSAGE.to_string(),
        _ => failure.to_string(),
    };
    ApiError::new(code, message)
}

/// A success response whose body did not match the expected shape.
pub fn classify_decode_error(response: &RawResponse, err: &serde_json::Error) -> ApiError {
    ApiError::new(ErrorCode::UnknownError, "Malformed response body").with_details(json!({
        "status": response.status(),
        "reason": err.to_string(),
    }))
}

/// Length and digest of a body, for logs that must not carry its contents.
pub fn summarize_body(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}
