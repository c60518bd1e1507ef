//! Domain-level client features (auth, registrations) and their shared logic.
//! Front ends import these modules to keep view code focused while security
//! and API handling stay in dedicated feature areas.

pub mod auth;
pub mod registrations;
