use crate::features::auth::state::AccessPredicates;
use crate::routes::{RouteRequirement, paths, requirement_for};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RenderLoading,
    Redirect(&'static str),
}

/// Decides whether `requirement` may be rendered for the current auth state.
///
/// Rules short-circuit in order: loading, authentication, tab gate,
/// administrator gate, explicit capability set. UX-only; the API still
/// enforces access on every call.
pub fn guard(auth: &impl AccessPredicates, requirement: &RouteRequirement) -> GuardDecision {
    if matches!(requirement, RouteRequirement::Public) {
        return GuardDecision::Allow;
    }
    if auth.is_loading() {
        return GuardDecision::RenderLoading;
    }
    if !auth.is_fully_authenticated() {
        return GuardDecision::Redirect(paths::LOGIN);
    }

    let admin = auth.is_administrator();
    let allowed = match requirement {
        RouteRequirement::Public | RouteRequirement::Authenticated => true,
        RouteRequirement::TabGated => admin || auth.has_any_tab_capability(),
        RouteRequirement::AdministratorOnly => admin,
        RouteRequirement::AnyOf(capabilities) => {
            admin || capabilities.iter().any(|c| auth.has_capability(*c))
        }
    };

    if allowed {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(paths::MENU)
    }
}

/// Convenience wrapper resolving the requirement from the path table.
pub fn guard_path(auth: &impl AccessPredicates, path: &str) -> GuardDecision {
    guard(auth, &requirement_for(path))
}
