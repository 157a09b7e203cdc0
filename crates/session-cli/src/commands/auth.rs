//! Authentication commands.

use super::AppContext;
use crate::boundary::CommandStatus;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use api_client::{ApiError, UserInfo};
use serde::Serialize;
use session_auth::{SessionPhase, SessionState};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How often `login --wait` re-checks the session.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

const LOGIN_RETRY_HINT: &str = "Run `sessionctl login` to try again.";

#[derive(Debug, Serialize)]
struct StatusView {
    api_url: String,
    phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

impl StatusView {
    fn new(api_url: String, state: SessionState) -> Self {
        let error = state.visible_error().cloned();
        Self {
            api_url,
            phase: state.phase,
            user: state.user,
            error,
        }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("API", &self.api_url))?;
        match &self.user {
            Some(user) => {
                writeln!(f, "{}", output::row("Session", "logged in"))?;
                writeln!(f, "{}", output::row("User", user.label()))?;
                write!(
                    f,
                    "{}",
                    output::row("Email", user.email.as_deref().unwrap_or("-"))
                )?;
            }
            None => write!(f, "{}", output::row("Session", "not logged in"))?,
        }
        if let Some(error) = &self.error {
            write!(f, "\n{}", output::row("Last error", error.user_message()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct UserView(UserInfo);

impl fmt::Display for UserView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("ID", &self.0.id))?;
        writeln!(
            f,
            "{}",
            output::row("Name", self.0.display_name.as_deref().unwrap_or("-"))
        )?;
        write!(f, "{}", output::row("Email", self.0.email.as_deref().unwrap_or("-")))
    }
}

/// Show the session status.
pub async fn status(ctx: &AppContext, format: &OutputFormat) -> Result<CommandStatus> {
    let state = ctx.session.wait_until_settled().await;
    let view = StatusView::new(ctx.session.client().base_url().to_string(), state);
    output::print(&view, format);
    Ok(CommandStatus::Success)
}

/// Start the browser login flow, optionally waiting for it to complete.
pub async fn login(
    ctx: &AppContext,
    wait: Option<Duration>,
    format: &OutputFormat,
) -> Result<CommandStatus> {
    let state = ctx.session.wait_until_settled().await;
    if let Some(user) = &state.user {
        output::print_success(&format!("Already logged in as {}", user.label()), format);
        return Ok(CommandStatus::Success);
    }

    if let Err(error) = ctx.session.login().await {
        output::print_api_error(&error, Some(LOGIN_RETRY_HINT), format);
        return Ok(CommandStatus::Failed);
    }

    let Some(wait) = wait else {
        output::print_success("Complete the login in your browser.", format);
        return Ok(CommandStatus::Success);
    };

    match wait_for_login(ctx, wait).await {
        Some(user) => {
            output::print_success(&format!("Logged in as {}", user.label()), format);
            Ok(CommandStatus::Success)
        }
        None => {
            output::print_error("Timed out waiting for login to complete", format);
            Ok(CommandStatus::Failed)
        }
    }
}

async fn wait_for_login(ctx: &AppContext, wait: Duration) -> Option<UserInfo> {
    let deadline = Instant::now() + wait;
    loop {
        let state = ctx.session.check_session().await;
        if let Some(user) = state.user {
            return Some(user);
        }
        if Instant::now() + LOGIN_POLL_INTERVAL > deadline {
            return None;
        }
        debug!("Login not complete yet, polling again");
        tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
    }
}

/// Log out.
pub async fn logout(ctx: &AppContext, format: &OutputFormat) -> Result<CommandStatus> {
    ctx.session.wait_until_settled().await;
    ctx.session.logout().await;
    output::print_success("Logged out successfully", format);
    Ok(CommandStatus::Success)
}

/// Show the logged-in user.
pub async fn whoami(ctx: &AppContext, format: &OutputFormat) -> Result<CommandStatus> {
    let state = ctx.session.wait_until_settled().await;
    match state.user {
        Some(user) => {
            output::print(&UserView(user), format);
            Ok(CommandStatus::Success)
        }
        None => {
            output::print_error("Not logged in. Run `sessionctl login` first.", format);
            Ok(CommandStatus::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TestApp;
    use api_client::{RawResponse, TransportFailure, IDENTITY_PATH, LOGIN_PATH};
    use serde_json::json;

    fn user() -> serde_json::Value {
        json!({ "id": "u1", "display_name": "Ada", "email": "ada@example.com" })
    }

    #[test]
    fn test_status_view_text() {
        let state = SessionState {
            phase: SessionPhase::Authenticated,
            user: Some(serde_json::from_value(user()).unwrap()),
            ..SessionState::default()
        };
        let text = StatusView::new("http://localhost:8000/api/".to_string(), state).to_string();

        assert!(text.contains("logged in"));
        assert!(text.contains("Ada"));
        assert!(text.contains("ada@example.com"));
        assert!(!text.contains("Last error"));
    }

    #[test]
    fn test_status_view_hides_background_errors() {
        let state = SessionState {
            phase: SessionPhase::Unauthenticated,
            error: Some(ApiError::new(api_client::ErrorCode::Http(401), "no session")),
            error_origin: Some(session_auth::ErrorOrigin::BackgroundCheck),
            ..SessionState::default()
        };
        let view = StatusView::new("http://localhost:8000/api/".to_string(), state);

        assert!(view.error.is_none());
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["phase"], "unauthenticated");
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn test_login_when_already_authenticated() {
        let app = TestApp::new();
        app.mock
            .push_for(IDENTITY_PATH, Ok(RawResponse::json(200, &user())));

        let status = login(&app.context(), None, &OutputFormat::Json).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(app.mock.attempts_for(LOGIN_PATH), 0);
    }

    #[tokio::test]
    async fn test_login_failure_reports_failed() {
        let app = TestApp::new();
        app.mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(401, &json!({ "message": "no session" }))),
        );
        app.mock.push_for(
            LOGIN_PATH,
            Err(TransportFailure::Connect("refused".to_string())),
        );

        let ctx = app.context();
        let status = login(&ctx, None, &OutputFormat::Json).await.unwrap();
        assert_eq!(status, CommandStatus::Failed);
        assert!(ctx.session.snapshot().visible_error().is_some());
        assert!(app.launcher.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_wait_polls_until_authenticated() {
        let app = TestApp::new();
        app.mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(401, &json!({ "message": "no session" }))),
        );
        app.mock.push_for(
            LOGIN_PATH,
            Ok(RawResponse::new(302, "").with_header("Location", "https://accounts.example.com/")),
        );
        app.mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(401, &json!({ "message": "no session" }))),
        );
        app.mock
            .push_for(IDENTITY_PATH, Ok(RawResponse::json(200, &user())));

        let ctx = app.context();
        let status = login(&ctx, Some(Duration::from_secs(30)), &OutputFormat::Json)
            .await
            .unwrap();

        assert_eq!(status, CommandStatus::Success);
        assert_eq!(app.launcher.launched(), vec!["https://accounts.example.com/"]);
        assert_eq!(app.mock.attempts_for(IDENTITY_PATH), 3);
        assert!(ctx.session.snapshot().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_wait_times_out() {
        let app = TestApp::new();
        app.mock.set_fallback(Ok(RawResponse::json(401, &json!({}))));
        app.mock.push_for(LOGIN_PATH, Ok(RawResponse::new(302, "")));

        let status = login(&app.context(), Some(Duration::from_secs(5)), &OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn test_whoami_requires_session() {
        let app = TestApp::new();
        app.mock.push_for(
            IDENTITY_PATH,
            Ok(RawResponse::json(401, &json!({ "message": "no session" }))),
        );

        let status = whoami(&app.context(), &OutputFormat::Json).await.unwrap();
        assert_eq!(status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let app = TestApp::new();
        app.mock
            .push_for(IDENTITY_PATH, Ok(RawResponse::json(200, &user())));

        let ctx = app.context();
        let status = logout(&ctx, &OutputFormat::Json).await.unwrap();
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(ctx.session.phase(), SessionPhase::Unauthenticated);
    }
}
