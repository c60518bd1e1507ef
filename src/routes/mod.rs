//! Application paths and their access requirements. The table is what the
//! guard consults; rendering is left to whichever front end embeds the crate.

use crate::features::auth::types::Capability;

pub mod paths {
    pub const LOGIN: &str = "/login";
    pub const VERIFY: &str = "/verify";
    pub const REGISTER: &str = "/register";
    pub const MENU: &str = "/menu";
    pub const DASHBOARD: &str = "/admin";
    pub const USERS: &str = "/admin/users";
    pub const PHOTOS: &str = "/admin/photos";
}

/// Access requirement declared by a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteRequirement {
    Public,
    Authenticated,
    /// Needs at least one dashboard tab capability.
    TabGated,
    AdministratorOnly,
    /// OR semantics across the listed capabilities.
    AnyOf(Vec<Capability>),
}

/// Requirement for a path; unknown paths only need authentication.
#[must_use]
pub fn requirement_for(path: &str) -> RouteRequirement {
    let path = normalize_path(path);
    match path {
        paths::LOGIN | paths::VERIFY | paths::REGISTER => RouteRequirement::Public,
        paths::MENU => RouteRequirement::Authenticated,
        paths::DASHBOARD => RouteRequirement::TabGated,
        paths::USERS => RouteRequirement::AdministratorOnly,
        paths::PHOTOS => RouteRequirement::AnyOf(vec![Capability::RegistrationPhotos]),
        _ => RouteRequirement::Authenticated,
    }
}

/// Drops query, fragment and trailing slash so `/admin/?tab=1` matches `/admin`.
fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path).trim();
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}
