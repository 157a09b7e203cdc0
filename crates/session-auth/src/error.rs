//! Session error types.

use thiserror::Error;

/// Errors from driving the session state machine.
///
/// These describe misuse of the manager itself. Failures talking to the API
/// are `ApiError`s and are stored in the session state instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// The manager was disposed; the update was dropped
    #[error("Session manager disposed")]
    Disposed,
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
