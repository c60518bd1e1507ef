//! Shared client utilities for API access, configuration, errors, and build metadata.
//!
//! ## Core Flows
//!
//! ### Operator login
//!
//! 1. **PIN:** The operator posts a PIN to `/api/admin/login`, receiving an opaque
//!    session token, subject metadata and the capability map.
//! 2. **Second factor:** A one-time code is requested through
//!    `/api/admin/2fa/send-code` and confirmed through `/api/admin/2fa/verify`.
//! 3. **Session:** Only after verification is the session persisted locally and
//!    the dashboard routes become reachable.
//!
//! ### Dashboard
//!
//! Registration and activity lists are read through the `*-optimized` paginated
//! endpoints. State-changing actions (finalize, revert, delete) are applied
//! optimistically and rolled back on failure.
//!
//! Centralizing these helpers keeps network behavior consistent and avoids
//! duplicated logic in features. Callers must avoid logging session tokens,
//! PINs, and one-time codes.

pub mod api;
#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
pub mod config;
pub mod errors;

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub use api::ApiClient;
pub use config::{AppConfig, Environment};
pub use errors::AppError;
