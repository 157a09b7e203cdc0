//! Scripted doubles for exercising the client without a network.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `test-support` feature.

use crate::client::RedirectLauncher;
use crate::error::TransportFailure;
use crate::http::{HttpTransport, RawResponse, RequestDescriptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

type Outcome = Result<RawResponse, TransportFailure>;

/// One attempt observed by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedAttempt {
    pub request: RequestDescriptor,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    shared: VecDeque<Outcome>,
    by_path: HashMap<String, VecDeque<Outcome>>,
    fallback: Option<Outcome>,
    latency: Option<Duration>,
    attempts: Vec<RecordedAttempt>,
}

/// [`HttpTransport`] that replays scripted outcomes.
///
/// Outcomes queued for a specific path are used first, then the shared
/// queue, then the fallback. With nothing scripted the attempt fails as if
/// the connection was refused.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next attempt on any path.
    pub fn push(&self, outcome: Outcome) {
        self.script.lock().shared.push_back(outcome);
    }

    /// Queue a JSON response for the next attempt on any path.
    pub fn push_response(&self, status: u16, body: Value) {
        self.push(Ok(RawResponse::json(status, &body)));
    }

    pub fn push_failure(&self, failure: TransportFailure) {
        self.push(Err(failure));
    }

    /// Queue an outcome for the next attempt on `path` only.
    pub fn push_for(&self, path: &str, outcome: Outcome) {
        self.script
            .lock()
            .by_path
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Outcome used once the queues are empty.
    pub fn set_fallback(&self, outcome: Outcome) {
        self.script.lock().fallback = Some(outcome);
    }

    /// Delay every attempt by `latency` before it resolves.
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = Some(latency);
    }

    pub fn attempts(&self) -> Vec<RecordedAttempt> {
        self.script.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.script.lock().attempts.len()
    }

    /// Attempts made against `path`.
    pub fn attempts_for(&self, path: &str) -> usize {
        self.script
            .lock()
            .attempts
            .iter()
            .filter(|attempt| attempt.request.path == path)
            .count()
    }

    /// Time elapsed between consecutive attempts.
    pub fn delays_between_attempts(&self) -> Vec<Duration> {
        let script = self.script.lock();
        script
            .attempts
            .windows(2)
            .map(|pair| pair[1].at.duration_since(pair[0].at))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        let (outcome, latency) = {
            let mut guard = self.script.lock();
            let script = &mut *guard;
            script.attempts.push(RecordedAttempt {
                request: request.clone(),
                at: Instant::now(),
            });

            let scripted = script
                .by_path
                .get_mut(&request.path)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.shared.pop_front())
                .or_else(|| script.fallback.clone());
            let outcome = scripted.unwrap_or_else(|| {
                Err(TransportFailure::Connect("no scripted response".to_string()))
            });
            (outcome, script.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

/// [`RedirectLauncher`] that records targets instead of opening them.
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.fail_with.lock() = Some(reason.into());
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().clone()
    }
}

impl RedirectLauncher for RecordingLauncher {
    fn launch(&self, target: &str) -> Result<(), String> {
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(reason);
        }
        self.launched.lock().push(target.to_string());
        Ok(())
    }
}
