//! Commands that fetch API resources.

use super::AppContext;
use crate::boundary::CommandStatus;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use api_client::{ApiError, RequestState, RequestTracker, Track};
use serde::Serialize;
use serde_json::Value;
use session_auth::AccessDecision;
use std::fmt;
use tracing::debug;

/// Route of the saved tracks view.
const TRACKS_ROUTE: &str = "/tracks";

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct TrackList(Vec<Track>);

impl fmt::Display for TrackList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No saved tracks.");
        }
        for (index, track) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{:>3}. {}", index + 1, track.name)?;
            if !track.artists.is_empty() {
                write!(f, " - {}", track.artist_names())?;
            }
            if let Some(url) = &track.external_urls.spotify {
                write!(f, "\n     {}", url)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct JsonView(Value);

impl fmt::Display for JsonView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

fn retry_hint(error: &ApiError) -> Option<&'static str> {
    if error.is_session_invalid() {
        Some("Run `sessionctl login` to sign in again.")
    } else if error.is_transient() {
        Some("The server is busy. Run the command again in a moment.")
    } else {
        None
    }
}

/// Returns false (after telling the user) unless `path` may be viewed.
async fn ensure_access(ctx: &AppContext, path: &str, format: &OutputFormat) -> bool {
    match ctx.guard.resolve(path).await {
        AccessDecision::Allow => true,
        decision @ AccessDecision::Redirect { .. } => {
            let location = decision.redirect_location().unwrap_or_default();
            debug!(path = %path, location = %location, "Access redirected to login");
            output::print_error(
                &format!("Not logged in. Run `sessionctl login` (login route: {}).", location),
                format,
            );
            false
        }
        AccessDecision::Defer => {
            output::print_error("Session is still being checked", format);
            false
        }
    }
}

/// Print a settled request, returning the command status.
fn report<T, V>(
    state: RequestState<T>,
    view: impl FnOnce(T) -> V,
    format: &OutputFormat,
) -> CommandStatus
where
    V: Serialize + fmt::Display,
{
    match (state.data, state.error) {
        (Some(data), _) => {
            output::print(&view(data), format);
            CommandStatus::Success
        }
        (None, Some(error)) => {
            output::print_api_error(&error, retry_hint(&error), format);
            CommandStatus::Failed
        }
        (None, None) => CommandStatus::Failed,
    }
}

/// List saved tracks.
pub async fn tracks(ctx: &AppContext, format: &OutputFormat) -> Result<CommandStatus> {
    if !ensure_access(ctx, TRACKS_ROUTE, format).await {
        return Ok(CommandStatus::Failed);
    }

    let tracker = RequestTracker::new();
    let state = tracker.execute(ctx.session.fetch_saved_tracks()).await;
    Ok(report(state, TrackList, format))
}

/// Fetch any protected resource by path.
pub async fn open(ctx: &AppContext, path: &str, format: &OutputFormat) -> Result<CommandStatus> {
    let route = format!("/{}", path.trim_start_matches('/'));
    if !ensure_access(ctx, &route, format).await {
        return Ok(CommandStatus::Failed);
    }

    let tracker = RequestTracker::new();
    let state = tracker
        .execute(ctx.session.fetch_resource::<Value>(route.trim_start_matches('/')))
        .await;
    Ok(report(state, JsonView, format))
}

/// Check API health. Needs no session.
pub async fn health(ctx: &AppContext, format: &OutputFormat) -> Result<CommandStatus> {
    let tracker = RequestTracker::new();
    let state = tracker.execute(ctx.session.client().health_check()).await;
    Ok(report(state, JsonView, format))
}
