//! Auth feature module covering PIN login, the emailed second factor, session
//! persistence and route gating. It keeps authentication logic out of the
//! views and must stay aligned with the backend's session token contract. This
//! module touches security boundaries and must avoid logging PINs, codes and
//! token material.
//!
//! Flow Overview: A PIN login yields a pending session. The second factor
//! controller sends and verifies a one-time code; on success the state machine
//! becomes fully authenticated and writes the versioned record. Startup calls
//! `restore`, which also migrates the legacy two-key layout.

pub mod client;
pub mod guards;
pub mod second_factor;
pub mod state;
pub mod storage;
pub mod types;

pub use client::AuthApi;
pub use guards::{GuardDecision, guard, guard_path};
pub use second_factor::{ChallengePhase, ChallengeStatus, SecondFactorController, SecondFactorError};
pub use state::{AccessPredicates, AuthState, AuthStateMachine, SharedAuth};
pub use storage::{FileStorage, MemoryStorage, PersistedSessionStore, SessionStorage};
