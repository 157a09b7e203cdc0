//! Session management on top of the session FSM.
//!
//! [`SessionManager`] owns the only shared mutable session state. Every
//! transition (check, login, logout, invalidation) runs behind one async
//! gate, so two identity resolutions can never race to set different users.
//! Consumers read snapshots or subscribe to changes through a `watch`
//! channel; they never mutate the state directly.

use crate::session_fsm::{SessionInput, SessionMachine, SessionPhase};
use crate::{SessionError, SessionResult};
use api_client::{
    ApiError, ApiResult, ErrorCode, RequestClient, Track, UserInfo, SAVED_TRACKS_PATH,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

/// Where a stored error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// The automatic identity check. A failure here just means "not logged in".
    BackgroundCheck,
    /// Something the user asked for.
    UserAction,
}

/// Snapshot of the session.
///
/// `user` is set exactly when `phase` is `Authenticated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<UserInfo>,
    pub error: Option<ApiError>,
    pub error_origin: Option<ErrorOrigin>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unknown,
            user: None,
            error: None,
            error_origin: None,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.phase.is_authenticated()
    }

    /// The error to show the user, if any.
    ///
    /// Background check failures stay silent.
    pub fn visible_error(&self) -> Option<&ApiError> {
        match self.error_origin {
            Some(ErrorOrigin::UserAction) => self.error.as_ref(),
            _ => None,
        }
    }
}

/// Tracks who is logged in.
pub struct SessionManager {
    client: Arc<RequestClient>,
    fsm: Mutex<SessionMachine>,
    state: watch::Sender<SessionState>,
    /// Serializes transitions, FIFO. Closed on dispose.
    gate: Arc<Semaphore>,
    completed_checks: AtomicU64,
    disposed: AtomicBool,
}

impl SessionManager {
    /// Create a manager in the `Unknown` phase without checking anything.
    pub fn new(client: Arc<RequestClient>) -> Self {
        Self::with_gate(client, 1)
    }

    fn with_gate(client: Arc<RequestClient>, permits: usize) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            client,
            fsm: Mutex::new(SessionMachine::new()),
            state,
            gate: Arc::new(Semaphore::new(permits)),
            completed_checks: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Create a manager and immediately start the initial session check.
    ///
    /// The phase is `CheckingSession` by the time this returns; the check
    /// itself runs on a spawned task. Must be called within a tokio runtime.
    pub fn start(client: Arc<RequestClient>) -> Arc<Self> {
        // The gate opens once the initial check has committed.
        let manager = Arc::new(Self::with_gate(client, 0));
        manager.begin_check();

        let weak = Arc::downgrade(&manager);
        let client = manager.client.clone();
        let gate = manager.gate.clone();
        tokio::spawn(async move {
            let result = client.fetch_current_user().await;
            match weak.upgrade() {
                Some(manager) => manager.finish_check(result),
                None => debug!("Session manager dropped before initial check completed"),
            }
            gate.add_permits(1);
        });

        manager
    }

    pub fn client(&self) -> &Arc<RequestClient> {
        &self.client
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    /// Receive every committed change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the phase is `Authenticated` or `Unauthenticated`.
    pub async fn wait_until_settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|state| state.phase.is_settled())
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Wait for this caller's turn to transition. `None` once disposed.
    async fn enter(&self) -> Option<SemaphorePermit<'_>> {
        match self.gate.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                debug!("Session manager disposed, skipping transition");
                None
            }
        }
    }

    /// Resolve the session identity with the server.
    ///
    /// If another check completed while this one waited its turn, that
    /// result is returned instead of asking again.
    pub async fn check_session(&self) -> SessionState {
        let seen = self.completed_checks.load(Ordering::SeqCst);
        let Some(_permit) = self.enter().await else {
            return self.snapshot();
        };

        if self.completed_checks.load(Ordering::SeqCst) != seen {
            debug!("Session check coalesced with one that just completed");
            return self.snapshot();
        }

        self.begin_check();
        let result = self.client.fetch_current_user().await;
        self.finish_check(result);
        self.snapshot()
    }

    fn begin_check(&self) {
        if let Err(e) = self.transition(&SessionInput::CheckStarted, |_| {}) {
            warn!(error = %e, "Could not start session check");
        }
    }

    fn finish_check(&self, result: ApiResult<UserInfo>) {
        self.completed_checks.fetch_add(1, Ordering::SeqCst);

        let outcome = match result {
            Ok(user) => {
                info!(user_id = %user.id, "Session confirmed");
                self.transition(&SessionInput::IdentityConfirmed, move |state| {
                    state.user = Some(user);
                    state.error = None;
                    state.error_origin = None;
                })
            }
            Err(error) => {
                debug!(code = %error.code(), "No active session");
                self.transition(&SessionInput::IdentityRejected, move |state| {
                    state.error = Some(error);
                    state.error_origin = Some(ErrorOrigin::BackgroundCheck);
                })
            }
        };

        if let Err(e) = outcome {
            debug!(error = %e, "Dropped session check result");
        }
    }

    /// Start the external login flow.
    ///
    /// The phase is `CheckingSession` while the login endpoint is contacted
    /// and returns to the previous settled phase afterwards. A failure is
    /// stored as a user-visible error. The new identity is picked up by the
    /// next [`check_session`](Self::check_session).
    pub async fn login(&self) -> ApiResult<()> {
        let Some(_permit) = self.enter().await else {
            return Err(ApiError::new(ErrorCode::UnknownError, "Session is closed"));
        };
        let previous = self.snapshot();

        if let Err(e) = self.transition(&SessionInput::LoginStarted, |state| {
            state.error = None;
            state.error_origin = None;
        }) {
            warn!(error = %e, "Could not start login");
        }

        let result = self.client.initiate_login().await;
        let error = result.as_ref().err().cloned();
        if let Some(error) = &error {
            warn!(code = %error.code(), "Login failed");
        }

        let restore = match (previous.phase, previous.user) {
            (SessionPhase::Authenticated, Some(user)) => {
                self.transition(&SessionInput::IdentityConfirmed, move |state| {
                    state.user = Some(user);
                    state.error_origin = error.as_ref().map(|_| ErrorOrigin::UserAction);
                    state.error = error;
                })
            }
            _ => self.transition(&SessionInput::IdentityRejected, move |state| {
                state.error_origin = error.as_ref().map(|_| ErrorOrigin::UserAction);
                state.error = error;
            }),
        };
        if let Err(e) = restore {
            debug!(error = %e, "Dropped login result");
        }

        result
    }

    /// Log out locally, then tell the server on a best-effort basis.
    ///
    /// Does nothing when already logged out.
    pub async fn logout(&self) {
        let Some(_permit) = self.enter().await else {
            return;
        };

        if self.phase() == SessionPhase::Unauthenticated {
            debug!("Already logged out");
            return;
        }

        match self.transition(&SessionInput::LogoutRequested, |state| {
            state.error = None;
            state.error_origin = None;
        }) {
            Ok(_) => info!("Logged out"),
            Err(e) => warn!(error = %e, "Could not log out locally"),
        }

        if let Err(error) = self.client.logout().await {
            debug!(code = %error.code(), "Remote logout failed; local session already cleared");
        }
    }

    /// Drop an authenticated session after the server rejected it.
    ///
    /// No-op unless the phase is `Authenticated`.
    pub async fn invalidate_session(&self, error: ApiError) {
        self.invalidate(error, None).await;
    }

    /// With `issued_after`, the rejection is dropped if a session check
    /// completed since then: that check's answer is newer.
    async fn invalidate(&self, error: ApiError, issued_after: Option<u64>) {
        let Some(_permit) = self.enter().await else {
            return;
        };

        if self.phase() != SessionPhase::Authenticated {
            return;
        }
        if let Some(issued_after) = issued_after {
            if self.completed_checks.load(Ordering::SeqCst) != issued_after {
                debug!(
                    code = %error.code(),
                    "Ignoring rejection older than the last session check"
                );
                return;
            }
        }

        warn!(code = %error.code(), "Session rejected by server");
        if let Err(e) = self.transition(&SessionInput::SessionInvalidated, move |state| {
            state.error = Some(error);
            state.error_origin = Some(ErrorOrigin::UserAction);
        }) {
            debug!(error = %e, "Dropped session invalidation");
        }
    }

    /// Await an authenticated call; a 401 invalidates the session unless
    /// a session check completed while the call was in flight.
    pub async fn authorized<T, F>(&self, call: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let issued_after = self.completed_checks.load(Ordering::SeqCst);
        let result = call.await;
        if let Err(error) = &result {
            if error.is_session_invalid() {
                self.invalidate(error.clone(), Some(issued_after)).await;
            }
        }
        result
    }

    pub async fn fetch_resource<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.authorized(self.client.fetch_resource(path)).await
    }

    pub async fn fetch_saved_tracks(&self) -> ApiResult<Vec<Track>> {
        debug!(path = SAVED_TRACKS_PATH, "Fetching saved tracks");
        self.authorized(self.client.fetch_saved_tracks()).await
    }

    /// Stop applying results. Calls still in flight finish, but their
    /// outcomes are discarded.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.gate.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Transition the FSM and commit the new state.
    ///
    /// `update` may set the user and error fields; the user is cleared
    /// whenever the resulting phase is not `Authenticated`.
    fn transition(
        &self,
        input: &SessionInput,
        update: impl FnOnce(&mut SessionState),
    ) -> SessionResult<SessionPhase> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }

        let mut fsm = self.fsm.lock();
        let old_phase = SessionPhase::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_phase = SessionPhase::from(fsm.state());
        self.state.send_modify(|state| {
            state.phase = new_phase;
            update(state);
            if !new_phase.is_authenticated() {
                state.user = None;
            }
        });
        drop(fsm);

        if old_phase != new_phase {
            debug!(
                old_phase = %old_phase,
                new_phase = %new_phase,
                "Session state transition"
            );
        }

        Ok(new_phase)
    }
}
