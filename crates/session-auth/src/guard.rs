//! Access decisions for protected views.

use crate::session::{SessionManager, SessionState};
use crate::session_fsm::SessionPhase;
use std::sync::Arc;
use url::form_urlencoded;

/// What a protected view should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Render the view.
    Allow,
    /// The session is not resolved yet; render nothing and wait.
    Defer,
    /// Send the user to `target`, remembering where they were going.
    Redirect { target: String, return_path: String },
}

impl AccessDecision {
    /// The redirect URL with the return path in a `from` query parameter.
    pub fn redirect_location(&self) -> Option<String> {
        match self {
            AccessDecision::Redirect {
                target,
                return_path,
            } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("from", return_path)
                    .finish();
                let separator = if target.contains('?') { '&' } else { '?' };
                Some(format!("{}{}{}", target, separator, query))
            }
            _ => None,
        }
    }
}

/// Decide access for `current_path` from a session snapshot.
pub fn decide(state: &SessionState, login_target: &str, current_path: &str) -> AccessDecision {
    match state.phase {
        SessionPhase::Unknown | SessionPhase::CheckingSession => AccessDecision::Defer,
        SessionPhase::Authenticated => AccessDecision::Allow,
        SessionPhase::Unauthenticated => AccessDecision::Redirect {
            target: login_target.to_string(),
            return_path: current_path.to_string(),
        },
    }
}

/// Guards protected views with the session held by a [`SessionManager`].
#[derive(Clone)]
pub struct AccessGuard {
    session: Arc<SessionManager>,
    login_target: String,
}

impl AccessGuard {
    pub fn new(session: Arc<SessionManager>, login_target: impl Into<String>) -> Self {
        Self {
            session,
            login_target: login_target.into(),
        }
    }

    pub fn login_target(&self) -> &str {
        &self.login_target
    }

    /// Decide from the current snapshot. May return [`AccessDecision::Defer`].
    pub fn decide(&self, current_path: &str) -> AccessDecision {
        decide(&self.session.snapshot(), &self.login_target, current_path)
    }

    /// Wait for the session to settle, then decide.
    pub async fn resolve(&self, current_path: &str) -> AccessDecision {
        let state = self.session.wait_until_settled().await;
        decide(&state, &self.login_target, current_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::testing::{MockTransport, RecordingLauncher};
    use api_client::{ErrorCode, RawResponse, RequestClient, RetryPolicy, UserInfo, IDENTITY_PATH};
    use serde_json::json;
    use url::Url;

    fn state(phase: SessionPhase) -> SessionState {
        let user = phase.is_authenticated().then(|| UserInfo {
            id: "u1".to_string(),
            display_name: None,
            email: None,
        });
        SessionState {
            phase,
            user,
            ..SessionState::default()
        }
    }

    fn manager_with(mock: &Arc<MockTransport>) -> Arc<SessionManager> {
        let client = RequestClient::new(
            mock.clone(),
            Url::parse("http://localhost:8000/api/").unwrap(),
            RetryPolicy::default(),
            Arc::new(RecordingLauncher::new()),
        );
        SessionManager::start(Arc::new(client))
    }

    #[test]
    fn test_unsettled_phases_defer() {
        assert_eq!(
            decide(&state(SessionPhase::Unknown), "/login", "/tracks"),
            AccessDecision::Defer
        );
        assert_eq!(
            decide(&state(SessionPhase::CheckingSession), "/login", "/tracks"),
            AccessDecision::Defer
        );
    }

    #[test]
    fn test_only_authenticated_is_allowed() {
        assert_eq!(
            decide(&state(SessionPhase::Authenticated), "/login", "/tracks"),
            AccessDecision::Allow
        );
    }

    #[test]
    fn test_unauthenticated_redirects_with_path() {
        let decision = decide(&state(SessionPhase::Unauthenticated), "/login", "/recommendations");
        assert_eq!(
            decision,
            AccessDecision::Redirect {
                target: "/login".to_string(),
                return_path: "/recommendations".to_string(),
            }
        );
        assert_eq!(
            decision.redirect_location().as_deref(),
            Some("/login?from=%2Frecommendations")
        );
    }

    #[test]
    fn test_redirect_location_appends_to_existing_query() {
        let decision = AccessDecision::Redirect {
            target: "/login?prompt=consent".to_string(),
            return_path: "/tracks?page=2".to_string(),
        };
        assert_eq!(
            decision.redirect_location().as_deref(),
            Some("/login?prompt=consent&from=%2Ftracks%3Fpage%3D2")
        );
        assert!(AccessDecision::Allow.redirect_location().is_none());
    }

    #[tokio::test]
    async fn test_guard_defers_until_check_completes() {
        let mock = Arc::new(MockTransport::new());
        mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(200, &json!({ "id": "u1" }))),
        );

        let guard = AccessGuard::new(manager_with(&mock), "/login");
        assert_eq!(guard.decide("/tracks"), AccessDecision::Defer);
        assert_eq!(guard.resolve("/tracks").await, AccessDecision::Allow);
    }

    #[tokio::test]
    async fn test_no_session_redirects_to_login_preserving_path() {
        let mock = Arc::new(MockTransport::new());
        mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(401, &json!({ "message": "no session" }))),
        );

        let session = manager_with(&mock);
        let guard = AccessGuard::new(session.clone(), "/login");
        let decision = guard.resolve("/recommendations").await;

        let state = session.snapshot();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        let error = state.error.unwrap();
        assert_eq!(error.code(), ErrorCode::Http(401));
        assert_eq!(error.code().to_string(), "HTTP_401");
        assert_eq!(error.message(), "no session");

        assert_eq!(
            decision,
            AccessDecision::Redirect {
                target: "/login".to_string(),
                return_path: "/recommendations".to_string(),
            }
        );
    }
}
