//! `{data, loading, error}` tracking for one operation.

use crate::error::{ApiError, ApiResult};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Snapshot of one tracked operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> RequestState<T> {
    /// Settled with either data or an error.
    pub fn is_settled(&self) -> bool {
        !self.loading && (self.data.is_some() || self.error.is_some())
    }
}

/// Tracks the state of calls issued through it.
///
/// Subscribers are notified on every change. When calls overlap, the one
/// that settles last determines the final state.
pub struct RequestTracker<T> {
    state: watch::Sender<RequestState<T>>,
    disposed: AtomicBool,
}

impl<T> Default for RequestTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestTracker<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            state,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    /// Return to `{data: None, loading: false, error: None}`.
    pub fn reset(&self) {
        self.state.send_replace(RequestState::default());
    }

    /// Stop accepting results. Calls still in flight are discarded when
    /// they settle.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl<T: Clone> RequestTracker<T> {
    pub fn snapshot(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    /// Run `call`, tracking its progress.
    ///
    /// `loading` is false again once this returns, whatever the call did.
    /// A panic inside the call is reported as `UNKNOWN_ERROR`.
    pub async fn execute<F>(&self, call: F) -> RequestState<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        if self.is_disposed() {
            debug!("Ignoring execute on disposed tracker");
            return self.snapshot();
        }

        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                warn!("Tracked call panicked");
                Err(ApiError::unexpected())
            }
        };

        if self.is_disposed() {
            debug!("Discarding result for disposed tracker");
            return self.snapshot();
        }

        self.state.send_modify(|state| {
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                }
                Err(error) => {
                    state.data = None;
                    state.error = Some(error);
                }
            }
            state.loading = false;
        });
        self.snapshot()
    }
}
