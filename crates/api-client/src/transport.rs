//! Retrying transport with bounded exponential backoff.
//!
//! ```text
//! attempt 1 ──► retryable? ──► sleep base·2⁰ ──► attempt 2 ──► retryable? ──► sleep base·2¹ ──► attempt 3
//!     │              │                              │              │                              │
//!   success        final                          success        final                      success/final
//! ```
//!
//! Retryable outcomes: HTTP 429, HTTP 503, timeout, connection reset.
//! Anything else ends the call on the attempt that produced it.

use crate::classifier::{classify, FailedOutcome};
use crate::error::ApiResult;
use crate::http::{HttpTransport, RawResponse, RequestDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget and backoff for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match 2u32.checked_pow(retry.saturating_sub(1)) {
            Some(factor) => self.backoff_base.saturating_mul(factor),
            None => Duration::MAX,
        }
    }

    /// Statuses worth retrying: rate limiting and temporary unavailability.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 503)
    }

    fn is_retryable(outcome: &FailedOutcome) -> bool {
        match outcome {
            FailedOutcome::Response(response) => Self::is_retryable_status(response.status()),
            FailedOutcome::Transport(failure) => failure.is_transient(),
        }
    }
}

/// Attempt counter for one logical call. Lives on the stack of
/// [`RetryingTransport::send`], so concurrent calls never share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Current attempt, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryContext {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts(),
        }
    }

    pub fn has_budget(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Move to the next attempt and return the retry number (1-based).
    fn advance(&mut self) -> u32 {
        let retry = self.attempt;
        self.attempt += 1;
        retry
    }
}

/// Wraps an [`HttpTransport`] with the retry policy and error classification.
#[derive(Clone)]
pub struct RetryingTransport {
    inner: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request`, retrying transient failures.
    ///
    /// Attempts are strictly sequential: the next attempt starts only after
    /// the previous outcome and its backoff delay. Any non-error response
    /// (2xx, or 3xx since redirects are not followed) ends the call.
    pub async fn send(&self, request: &RequestDescriptor) -> ApiResult<RawResponse> {
        let mut ctx = RetryContext::new(&self.policy);

        loop {
            let outcome = match self.inner.execute(request).await {
                Ok(response) if !response.is_error() => {
                    debug!(
                        path = %request.path,
                        status = response.status(),
                        attempt = ctx.attempt,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Ok(response) => FailedOutcome::Response(response),
                Err(failure) => FailedOutcome::Transport(failure),
            };

            if !RetryPolicy::is_retryable(&outcome) {
                let error = classify(&outcome);
                debug!(
                    path = %request.path,
                    attempt = ctx.attempt,
                    code = %error.code(),
                    "Request failed with non-retryable outcome"
                );
                return Err(error);
            }

            if !ctx.has_budget() {
                let error = classify(&outcome);
                warn!(
                    path = %request.path,
                    attempts = ctx.attempt,
                    code = %error.code(),
                    "Request failed after exhausting retries"
                );
                return Err(error);
            }

            let retry = ctx.advance();
            let delay = self.policy.delay_for_retry(retry);
            warn!(
                path = %request.path,
                attempt = ctx.attempt,
                max_attempts = ctx.max_attempts,
                delay_ms = delay_millis(delay),
                outcome = %outcome_label(&outcome),
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn outcome_label(outcome: &FailedOutcome) -> String {
    match outcome {
        FailedOutcome::Response(response) => format!("HTTP {}", response.status()),
        FailedOutcome::Transport(failure) => failure.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, TransportFailure};
    use crate::testing::MockTransport;
    use serde_json::json;

    fn retrying(mock: &Arc<MockTransport>) -> RetryingTransport {
        RetryingTransport::new(mock.clone(), RetryPolicy::default())
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(80), Duration::MAX);
    }

    #[test]
    fn test_delay_millis_clamps_instead_of_wrapping() {
        assert_eq!(delay_millis(Duration::from_secs(4)), 4_000);
        assert_eq!(delay_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(RetryPolicy::is_retryable_status(429));
        assert!(RetryPolicy::is_retryable_status(503));
        assert!(!RetryPolicy::is_retryable_status(500));
        assert!(!RetryPolicy::is_retryable_status(502));
        assert!(!RetryPolicy::is_retryable_status(401));
    }

    #[test]
    fn test_retry_context_budget() {
        let mut ctx = RetryContext::new(&RetryPolicy::default());
        assert_eq!(ctx.attempt, 1);
        assert!(ctx.has_budget());
        assert_eq!(ctx.advance(), 1);
        assert_eq!(ctx.advance(), 2);
        assert_eq!(ctx.attempt, 3);
        assert!(!ctx.has_budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure(TransportFailure::Timeout);
        mock.push_response(503, json!({ "message": "maintenance" }));
        mock.push_response(200, json!({ "id": "u1" }));

        let response = retrying(&mock)
            .send(&RequestDescriptor::get("auth/me"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(mock.attempt_count(), 3);
        assert_eq!(
            mock.delays_between_attempts(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retryable_kind_is_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(429, json!({}));
        mock.push_failure(TransportFailure::ConnectionReset);
        mock.push_response(204, json!(null));

        let response = retrying(&mock)
            .send(&RequestDescriptor::get("saved-tracks"))
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
        assert_eq!(mock.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_503_exhausts_budget() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..4 {
            mock.push_response(503, json!({ "message": "unavailable" }));
        }

        let error = retrying(&mock)
            .send(&RequestDescriptor::get("saved-tracks"))
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::Http(503));
        assert_eq!(error.message(), "unavailable");
        assert_eq!(mock.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_400_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(400, json!({ "message": "bad request" }));
        mock.push_response(200, json!({}));

        let error = retrying(&mock)
            .send(&RequestDescriptor::get("saved-tracks"))
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::Http(400));
        assert_eq!(mock.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_401_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(401, json!({ "message": "no session" }));

        let error = retrying(&mock)
            .send(&RequestDescriptor::get("auth/me"))
            .await
            .unwrap_err();

        assert!(error.is_session_invalid());
        assert_eq!(mock.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure(TransportFailure::Connect("refused".into()));

        let error = retrying(&mock)
            .send(&RequestDescriptor::get("auth/me"))
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::NetworkError);
        assert_eq!(mock.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_timeouts_classify_as_timeout() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..3 {
            mock.push_failure(TransportFailure::Timeout);
        }

        let error = retrying(&mock)
            .send(&RequestDescriptor::get("auth/me"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::Timeout);
        assert_eq!(mock.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_resubmit_identical_request() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(429, json!({}));
        mock.push_response(200, json!({}));

        let request = RequestDescriptor::post("auth/logout")
            .with_header("X-Trace", "t-1")
            .with_json(json!({ "all_devices": true }));
        retrying(&mock).send(&request).await.unwrap();

        let attempts = mock.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].request, request);
        assert_eq!(attempts[1].request, request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_is_not_a_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.push(Ok(RawResponse::new(302, "")
            .with_header("Location", "https://accounts.example.com/authorize")));

        let response = retrying(&mock)
            .send(&RequestDescriptor::get("auth/spotify-login"))
            .await
            .unwrap();
        assert!(response.is_redirect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_keep_separate_budgets() {
        let mock = Arc::new(MockTransport::new());
        // Both calls fail twice then succeed; a shared counter would exhaust
        // one of them early.
        mock.push_for("a", Err(TransportFailure::Timeout));
        mock.push_for("a", Err(TransportFailure::Timeout));
        mock.push_for("a", Ok(RawResponse::json(200, &json!({ "call": "a" }))));
        mock.push_for("b", Ok(RawResponse::json(503, &json!({}))));
        mock.push_for("b", Ok(RawResponse::json(503, &json!({}))));
        mock.push_for("b", Ok(RawResponse::json(200, &json!({ "call": "b" }))));

        let transport = retrying(&mock);
        let a = RequestDescriptor::get("a");
        let b = RequestDescriptor::get("b");
        let (ra, rb) = tokio::join!(transport.send(&a), transport.send(&b));

        assert_eq!(ra.unwrap().status(), 200);
        assert_eq!(rb.unwrap().status(), 200);
        assert_eq!(mock.attempt_count(), 6);
    }
}
