//! # intake
//!
//! Client core for the intake registration console: the operator session
//! (PIN login, emailed second factor, persisted and migrated session record),
//! route gating by capability, and the dashboard data layer with debounced
//! search and optimistic registration changes.
//!
//! Front ends drive these types; the bundled `intake` binary is a thin CLI
//! over them.

#[path = "lib/mod.rs"]
pub mod app_lib;
pub mod cli;
pub mod features;
pub mod routes;

pub use app_lib::{ApiClient, AppConfig, AppError, Environment, GIT_COMMIT_HASH};
