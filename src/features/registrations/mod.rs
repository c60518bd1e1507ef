//! Dashboard data: registration and activity lists, summary counters, photos
//! and the public intake form. List state lives in `DataSyncController`; the
//! API client is a trait so controllers can be exercised without a server.

pub mod client;
pub mod form;
pub mod sync;
pub mod types;

pub use client::RegistrationsApi;
pub use form::{submit_registration, validate_registration};
pub use sync::{DataSyncController, ListSnapshot, MutationState, SyncError};
pub use types::{ListItem, ListKind, MutationAction, RegistrationRequest, SummaryCounters};
