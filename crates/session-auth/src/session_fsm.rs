//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │     Unknown     │ (initial)
//! └────────┬────────┘
//!          │ CheckStarted / LoginStarted
//!          ▼
//! ┌─────────────────┐  IdentityRejected   ┌─────────────────┐
//! │ CheckingSession │ ──────────────────► │ Unauthenticated │
//! └────────┬────────┘                     └────────┬────────┘
//!          │ IdentityConfirmed                     ▲ │ CheckStarted / LoginStarted
//!          ▼                                       │ └──────────► CheckingSession
//! ┌─────────────────┐  LogoutRequested /           │
//! │  Authenticated  │  SessionInvalidated ─────────┘
//! └────────┬────────┘
//!          │ CheckStarted / LoginStarted
//!          ▼
//!   CheckingSession
//! ```
//!
//! `CheckingSession` accepts only the two resolving inputs, so a logout can
//! never land in the middle of an identity check.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unknown)

    Unknown => {
        CheckStarted => CheckingSession,
        LoginStarted => CheckingSession,
        LogoutRequested => Unauthenticated
    },
    CheckingSession => {
        IdentityConfirmed => Authenticated,
        IdentityRejected => Unauthenticated
    },
    Authenticated => {
        CheckStarted => CheckingSession,
        LoginStarted => CheckingSession,
        LogoutRequested => Unauthenticated,
        // A request came back 401
        SessionInvalidated => Unauthenticated
    },
    Unauthenticated => {
        CheckStarted => CheckingSession,
        LoginStarted => CheckingSession,
        LogoutRequested => Unauthenticated
    }
}

pub use session_machine::Input as SessionInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing is known yet.
    Unknown,
    /// An identity check or login is in flight.
    CheckingSession,
    /// The server confirmed who the user is.
    Authenticated,
    /// No valid session.
    Unauthenticated,
}

impl SessionPhase {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionPhase::Authenticated)
    }

    /// Returns true once the phase is one an access decision can rely on.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SessionPhase::Authenticated | SessionPhase::Unauthenticated
        )
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unknown => SessionPhase::Unknown,
            SessionMachineState::CheckingSession => SessionPhase::CheckingSession,
            SessionMachineState::Authenticated => SessionPhase::Authenticated,
            SessionMachineState::Unauthenticated => SessionPhase::Unauthenticated,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionPhase::Unknown => "unknown",
            SessionPhase::CheckingSession => "checking_session",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Unauthenticated => "unauthenticated",
        };
        f.write_str(label)
    }
}
