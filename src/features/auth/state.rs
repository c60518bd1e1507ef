//! Auth session state machine.
//!
//! `Restoring → Anonymous → PendingSecondFactor → FullyAuthenticated`, and back
//! to `Anonymous` on logout. Transitions are the only way to change the session;
//! reads go through the derived predicates. Every transition into
//! `FullyAuthenticated` writes the persisted record and every transition into
//! `Anonymous` deletes it.

use crate::app_lib::AppError;
use crate::features::auth::{
    storage::{LoadOutcome, PersistedSessionStore},
    types::{Capability, PermissionSet, Session, SessionToken, Subject, SubjectType},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Shared handle used by controllers that drive transitions.
pub type SharedAuth = Arc<Mutex<AuthStateMachine>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Restoring,
    Anonymous,
    PendingSecondFactor(Session),
    FullyAuthenticated(Session),
}

impl AuthState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Restoring => "restoring",
            Self::Anonymous => "anonymous",
            Self::PendingSecondFactor(_) => "pending second factor",
            Self::FullyAuthenticated(_) => "fully authenticated",
        }
    }
}

/// Read-only view consumed by the route guard.
pub trait AccessPredicates {
    fn is_loading(&self) -> bool;
    fn is_fully_authenticated(&self) -> bool;
    fn is_administrator(&self) -> bool;
    fn has_capability(&self, capability: Capability) -> bool;
    fn has_any_tab_capability(&self) -> bool;
}

pub struct AuthStateMachine {
    state: AuthState,
    store: PersistedSessionStore,
}

impl AuthStateMachine {
    #[must_use]
    pub fn new(store: PersistedSessionStore) -> Self {
        Self {
            state: AuthState::Restoring,
            store,
        }
    }

    #[must_use]
    pub fn shared(self) -> SharedAuth {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Session in any non-anonymous state.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            AuthState::PendingSecondFactor(session) | AuthState::FullyAuthenticated(session) => {
                Some(session)
            }
            AuthState::Restoring | AuthState::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_pending_second_factor(&self) -> bool {
        matches!(self.state, AuthState::PendingSecondFactor(_))
    }

    /// Records a successful primary-factor (PIN) login.
    ///
    /// A fully authenticated machine ignores the call and keeps its session.
    pub fn login_primary(
        &mut self,
        subject: Subject,
        permissions: PermissionSet,
        token: SessionToken,
    ) -> &AuthState {
        if matches!(self.state, AuthState::FullyAuthenticated(_)) {
            warn!("primary login ignored: already fully authenticated");
            return &self.state;
        }
        info!(subject = %subject.id, "primary factor verified");
        self.state = AuthState::PendingSecondFactor(Session {
            subject,
            permissions,
            token,
            second_factor_complete: false,
        });
        &self.state
    }

    /// Promotes the pending session after the second factor is verified.
    ///
    /// # Errors
    /// Returns `AppError::Transition` when there is no pending session, and
    /// `AppError::Storage` when the record cannot be written (the in-memory
    /// session is still promoted).
    pub fn complete_second_factor(&mut self, token: SessionToken) -> Result<&AuthState, AppError> {
        let mut session = match &self.state {
            AuthState::PendingSecondFactor(session) | AuthState::FullyAuthenticated(session) => {
                session.clone()
            }
            other => {
                let err = AppError::Transition {
                    from: other.name(),
                    operation: "complete second factor",
                };
                error!("{err}");
                return Err(err);
            }
        };

        if !token.is_empty() {
            session.token = token;
        }
        session.second_factor_complete = true;
        let persisted = self.store.save(&session);
        info!(subject = %session.subject.id, "session fully authenticated");
        self.state = AuthState::FullyAuthenticated(session);
        persisted?;
        Ok(&self.state)
    }

    /// Rebuilds state from the persisted record.
    ///
    /// Never fails: corrupt or unreadable records are discarded and the machine
    /// falls back to `Anonymous`. A live session created by a login that raced
    /// this call is left untouched.
    pub fn restore(&mut self) -> &AuthState {
        if matches!(
            self.state,
            AuthState::PendingSecondFactor(_) | AuthState::FullyAuthenticated(_)
        ) {
            return &self.state;
        }

        self.state = match self.store.load() {
            Ok(LoadOutcome::Current(session) | LoadOutcome::Migrated(session)) => {
                info!(subject = %session.subject.id, "session restored");
                AuthState::FullyAuthenticated(session)
            }
            Ok(LoadOutcome::Empty) => AuthState::Anonymous,
            Ok(LoadOutcome::Corrupt(reason)) => {
                warn!("discarding corrupt session record: {reason}");
                if let Err(err) = self.store.clear() {
                    error!("failed to remove corrupt session record: {err}");
                }
                AuthState::Anonymous
            }
            Err(err) => {
                error!("failed to read session record: {err}");
                AuthState::Anonymous
            }
        };
        &self.state
    }

    /// Drops the session from memory and storage.
    ///
    /// # Errors
    /// Returns `AppError::Storage` if the record cannot be removed; the machine
    /// is anonymous regardless.
    pub fn logout(&mut self) -> Result<&AuthState, AppError> {
        if let Some(session) = self.session() {
            info!(subject = %session.subject.id, "logout");
        }
        self.state = AuthState::Anonymous;
        self.store.clear()?;
        Ok(&self.state)
    }

    /// Whether a persisted record currently exists.
    pub fn has_persisted_record(&self) -> Result<bool, AppError> {
        self.store.has_record()
    }

    fn authenticated_session(&self) -> Option<&Session> {
        match &self.state {
            AuthState::FullyAuthenticated(session) => Some(session),
            _ => None,
        }
    }
}

impl AccessPredicates for AuthStateMachine {
    fn is_loading(&self) -> bool {
        matches!(self.state, AuthState::Restoring)
    }

    fn is_fully_authenticated(&self) -> bool {
        self.authenticated_session().is_some()
    }

    fn is_administrator(&self) -> bool {
        self.authenticated_session()
            .is_some_and(|s| s.subject.subject_type == SubjectType::Administrator)
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.is_administrator()
            || self
                .authenticated_session()
                .is_some_and(|s| s.permissions.get(capability))
    }

    fn has_any_tab_capability(&self) -> bool {
        Capability::TABS.into_iter().any(|c| self.has_capability(c))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::features::auth::storage::{
        LEGACY_AUTH_KEY, LEGACY_USER_KEY, MemoryStorage, SESSION_KEY, SessionStorage,
    };

    fn machine() -> AuthStateMachine {
        AuthStateMachine::new(PersistedSessionStore::new(MemoryStorage::new()))
    }

    fn machine_with(storage: MemoryStorage) -> AuthStateMachine {
        AuthStateMachine::new(PersistedSessionStore::new(storage))
    }

    fn login_and_verify(machine: &mut AuthStateMachine, subject: Subject, perms: PermissionSet) {
        machine.login_primary(subject, perms, SessionToken::new("pin-token"));
        machine
            .complete_second_factor(SessionToken::new("full-token"))
            .unwrap();
    }

    #[test]
    fn starts_loading_until_restored() {
        let mut machine = machine();
        assert!(machine.is_loading());
        assert_eq!(machine.restore(), &AuthState::Anonymous);
        assert!(!machine.is_loading());
    }

    #[test]
    fn login_then_second_factor_authenticates_and_persists() {
        let mut machine = machine();
        machine.restore();
        machine.login_primary(
            Subject::ordinary("u1"),
            PermissionSet::new(),
            SessionToken::new("pin-token"),
        );
        assert!(machine.is_pending_second_factor());
        assert!(!machine.is_fully_authenticated());
        assert!(!machine.has_persisted_record().unwrap());

        machine
            .complete_second_factor(SessionToken::new("full-token"))
            .unwrap();
        assert!(machine.is_fully_authenticated());
        assert_eq!(machine.session().unwrap().token.expose(), "full-token");
        assert!(machine.has_persisted_record().unwrap());
    }

    #[test]
    fn complete_second_factor_from_anonymous_fails() {
        let mut machine = machine();
        machine.restore();
        let result = machine.complete_second_factor(SessionToken::new("t"));
        assert_eq!(
            result.err(),
            Some(AppError::Transition {
                from: "anonymous",
                operation: "complete second factor"
            })
        );
        assert_eq!(machine.state(), &AuthState::Anonymous);
    }

    #[test]
    fn login_primary_is_noop_when_authenticated() {
        let mut machine = machine();
        machine.restore();
        login_and_verify(&mut machine, Subject::ordinary("u1"), PermissionSet::new());
        let state = machine
            .login_primary(
                Subject::ordinary("u2"),
                PermissionSet::new(),
                SessionToken::new("other"),
            )
            .clone();
        assert!(matches!(state, AuthState::FullyAuthenticated(s) if s.subject.id == "u1"));
    }

    #[test]
    fn administrator_has_every_capability() {
        let mut machine = machine();
        machine.restore();
        login_and_verify(
            &mut machine,
            Subject::administrator("admin"),
            PermissionSet::new().with(Capability::Activities, false),
        );
        for capability in Capability::ALL {
            assert!(machine.has_capability(capability), "{capability:?}");
        }
        assert!(machine.has_any_tab_capability());
    }

    #[test]
    fn pending_session_grants_nothing() {
        let mut machine = machine();
        machine.restore();
        machine.login_primary(
            Subject::administrator("admin"),
            PermissionSet::new().with(Capability::Activities, true),
            SessionToken::new("t"),
        );
        assert!(!machine.is_administrator());
        assert!(!machine.has_capability(Capability::Activities));
    }

    #[test]
    fn logout_revokes_capabilities_and_record() {
        let mut machine = machine();
        machine.restore();
        login_and_verify(
            &mut machine,
            Subject::ordinary("u1"),
            PermissionSet::new().with(Capability::PendingRegistrations, true),
        );
        machine.logout().unwrap();
        for capability in Capability::ALL {
            assert!(!machine.has_capability(capability));
        }
        assert!(!machine.has_any_tab_capability());
        assert!(!machine.has_persisted_record().unwrap());
    }

    #[test]
    fn restore_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.set(LEGACY_AUTH_KEY, "true").unwrap();
        storage
            .set(
                LEGACY_USER_KEY,
                r#"{"id": "u1", "session_token": "tok", "permissions": {"activities": true}}"#,
            )
            .unwrap();
        let mut machine = machine_with(storage);

        let first = machine.restore().clone();
        assert!(matches!(first, AuthState::FullyAuthenticated(_)));
        for _ in 0..5 {
            assert_eq!(machine.restore(), &first);
        }
        assert!(machine.has_capability(Capability::Activities));
    }

    #[test]
    fn fresh_machines_restore_the_same_state_repeatedly() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        storage.set(LEGACY_AUTH_KEY, "true").unwrap();
        storage
            .set(LEGACY_USER_KEY, r#"{"id": "u1", "session_token": "tok"}"#)
            .unwrap();

        let mut states = Vec::new();
        for _ in 0..3 {
            let mut machine = machine_with_arc(storage.clone());
            states.push(machine.restore().clone());
        }
        assert!(states.windows(2).all(|pair| pair[0] == pair[1]));
        assert!(storage.get(SESSION_KEY).unwrap().is_some());
        assert_eq!(storage.get(LEGACY_USER_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_record_falls_back_to_anonymous() {
        let storage = MemoryStorage::new();
        storage.set(SESSION_KEY, "{not json").unwrap();
        let mut machine = machine_with(storage);
        assert_eq!(machine.restore(), &AuthState::Anonymous);
        assert!(!machine.has_persisted_record().unwrap());
    }

    #[test]
    fn restore_does_not_clobber_a_racing_login() {
        let storage = MemoryStorage::new();
        storage
            .set(LEGACY_USER_KEY, r#"{"id": "u1", "session_token": "tok"}"#)
            .unwrap();
        storage.set(LEGACY_AUTH_KEY, "true").unwrap();
        let mut machine = machine_with(storage);
        machine.login_primary(
            Subject::ordinary("u9"),
            PermissionSet::new(),
            SessionToken::new("t"),
        );
        assert!(machine.is_pending_second_factor());
        machine.restore();
        assert!(
            matches!(machine.state(), AuthState::PendingSecondFactor(s) if s.subject.id == "u9")
        );
    }

    fn machine_with_arc(storage: std::sync::Arc<MemoryStorage>) -> AuthStateMachine {
        AuthStateMachine::new(PersistedSessionStore::new(storage))
    }
}
