//! Session authentication for the request client.
//!
//! This crate provides:
//! - An explicit FSM for the session phase (`Unknown`, `CheckingSession`,
//!   `Authenticated`, `Unauthenticated`)
//! - [`SessionManager`], which runs one session transition at a time and
//!   publishes [`SessionState`] snapshots
//! - [`AccessGuard`], which turns a session snapshot into an access decision

mod error;
mod guard;
mod session;
mod session_fsm;

pub use error::{SessionError, SessionResult};
pub use guard::{decide, AccessDecision, AccessGuard};
pub use session::{ErrorOrigin, SessionManager, SessionState};
pub use session_fsm::session_machine;
pub use session_fsm::{SessionInput, SessionMachine, SessionMachineState, SessionPhase};
