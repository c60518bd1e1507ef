//! Durable session storage and legacy-schema migration.
//!
//! Flow Overview:
//! 1) `load` reads the versioned record under `intake_session`.
//! 2) When only the legacy pair (`admin_authenticated`, `current_user`) exists,
//!    it is validated, converted, written back under the current key and removed.
//! 3) Records missing required fields are reported as corrupt; the caller decides
//!    to discard them.
//!
//! Only the auth state machine owns a `PersistedSessionStore`; every other
//! component reads session data through the machine's predicates.

use crate::app_lib::AppError;
use crate::features::auth::types::{PermissionSet, Session, SessionToken, Subject, SubjectType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

pub const SESSION_KEY: &str = "intake_session";
pub const LEGACY_AUTH_KEY: &str = "admin_authenticated";
pub const LEGACY_USER_KEY: &str = "current_user";
pub const SCHEMA_VERSION: u32 = 1;

/// Minimal key/value contract, modelled on browser local storage.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("memory storage lock poisoned".to_string()))?;
        Ok(f(&mut entries))
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }
}

/// JSON object on disk holding every key; rewritten through a temp file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, AppError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Storage(format!("{} is not valid JSON: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(AppError::Storage(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        let body = serde_json::to_string_pretty(entries)
            .map_err(|err| AppError::Storage(format!("failed to encode storage: {err}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|err| {
                AppError::Storage(format!("failed to write {}: {err}", self.path.display()))
            })
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Storage("file storage lock poisoned".to_string()))?;
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Storage("file storage lock poisoned".to_string()))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedUser {
    pub id: String,
    pub subject_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Durable mirror of a fully authenticated session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSessionRecord {
    pub version: u32,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub second_factor_complete: bool,
    #[serde(default)]
    pub user: Option<PersistedUser>,
    #[serde(default)]
    pub session_token: Option<SessionToken>,
    #[serde(default)]
    pub permissions: Option<PermissionSet>,
}

impl PersistedSessionRecord {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            version: SCHEMA_VERSION,
            is_authenticated: true,
            second_factor_complete: session.second_factor_complete,
            user: Some(PersistedUser {
                id: session.subject.id.clone(),
                subject_type: session.subject.subject_type,
                name: session.subject.name.clone(),
                email: session.subject.email.clone(),
            }),
            session_token: Some(session.token.clone()),
            permissions: Some(session.permissions.clone()),
        }
    }

    /// Rebuilds the session, naming the first missing required field on failure.
    pub fn into_session(self) -> Result<Session, String> {
        if !self.is_authenticated {
            return Err("isAuthenticated is false".to_string());
        }
        if !self.second_factor_complete {
            return Err("secondFactorComplete is false".to_string());
        }
        let user = self.user.ok_or_else(|| "user is missing".to_string())?;
        if user.id.trim().is_empty() {
            return Err("user.id is empty".to_string());
        }
        let token = self
            .session_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| "sessionToken is missing".to_string())?;
        Ok(Session {
            subject: Subject {
                id: user.id,
                subject_type: user.subject_type,
                name: user.name,
                email: user.email,
            },
            permissions: self.permissions.unwrap_or_default(),
            token,
            second_factor_complete: true,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Empty,
    Current(Session),
    Migrated(Session),
    Corrupt(String),
}

pub struct PersistedSessionStore {
    storage: Box<dyn SessionStorage>,
}

impl PersistedSessionStore {
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Reads the current record, migrating the legacy pair when that is all there is.
    ///
    /// # Errors
    /// Returns `AppError::Storage` when the backing storage fails; malformed
    /// contents are reported as `LoadOutcome::Corrupt` instead.
    pub fn load(&self) -> Result<LoadOutcome, AppError> {
        if let Some(raw) = self.storage.get(SESSION_KEY)? {
            // A current record always wins; stale legacy keys are just dropped.
            self.remove_legacy()?;
            return Ok(parse_current(&raw));
        }

        let legacy_flag = self.storage.get(LEGACY_AUTH_KEY)?;
        let legacy_user = self.storage.get(LEGACY_USER_KEY)?;
        if legacy_flag.is_none() && legacy_user.is_none() {
            return Ok(LoadOutcome::Empty);
        }

        info!("migrating legacy session record");
        let outcome = match parse_legacy(legacy_flag.as_deref(), legacy_user.as_deref()) {
            Ok(session) => {
                self.save(&session)?;
                LoadOutcome::Migrated(session)
            }
            Err(reason) => LoadOutcome::Corrupt(reason),
        };
        self.remove_legacy()?;
        Ok(outcome)
    }

    pub fn save(&self, session: &Session) -> Result<(), AppError> {
        let record = PersistedSessionRecord::from_session(session);
        let body = serde_json::to_string(&record)
            .map_err(|err| AppError::Storage(format!("failed to encode session: {err}")))?;
        debug!(subject = %session.subject.id, "persisting session record");
        self.storage.set(SESSION_KEY, &body)
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.storage.remove(SESSION_KEY)?;
        self.remove_legacy()
    }

    /// Whether any session record (current or legacy) exists.
    pub fn has_record(&self) -> Result<bool, AppError> {
        Ok(self.storage.get(SESSION_KEY)?.is_some()
            || self.storage.get(LEGACY_AUTH_KEY)?.is_some()
            || self.storage.get(LEGACY_USER_KEY)?.is_some())
    }

    fn remove_legacy(&self) -> Result<(), AppError> {
        self.storage.remove(LEGACY_AUTH_KEY)?;
        self.storage.remove(LEGACY_USER_KEY)
    }
}

fn parse_current(raw: &str) -> LoadOutcome {
    let record = match serde_json::from_str::<PersistedSessionRecord>(raw) {
        Ok(record) => record,
        Err(err) => return LoadOutcome::Corrupt(format!("unreadable record: {err}")),
    };
    if record.version != SCHEMA_VERSION {
        return LoadOutcome::Corrupt(format!("unsupported schema version {}", record.version));
    }
    match record.into_session() {
        Ok(session) => LoadOutcome::Current(session),
        Err(reason) => LoadOutcome::Corrupt(reason),
    }
}

/// Legacy shape: `admin_authenticated = "true"` plus an untyped user object.
fn parse_legacy(flag: Option<&str>, user: Option<&str>) -> Result<Session, String> {
    if flag.map(str::trim) != Some("true") {
        return Err("legacy admin_authenticated flag is not \"true\"".to_string());
    }
    let user: Value = user
        .ok_or_else(|| "legacy current_user is missing".to_string())
        .and_then(|raw| {
            serde_json::from_str(raw).map_err(|err| format!("legacy current_user: {err}"))
        })?;

    let text = |key: &str| {
        user.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let id = text("id")
        .or_else(|| text("user_id"))
        .or_else(|| user.get("id").and_then(Value::as_i64).map(|id| id.to_string()))
        .ok_or_else(|| "legacy current_user has no id".to_string())?;
    let token = text("session_token").ok_or_else(|| "legacy session token missing".to_string())?;

    let is_admin = user.get("is_admin").and_then(Value::as_bool).unwrap_or(false)
        || text("role").is_some_and(|role| role.eq_ignore_ascii_case("admin"));

    let permissions = user
        .get("permissions")
        .and_then(Value::as_object)
        .map(|map| {
            PermissionSet::from_tags(
                map.iter()
                    .filter_map(|(k, v)| v.as_bool().map(|granted| (k.as_str(), granted))),
            )
        })
        .unwrap_or_default();

    if user.get("permissions").is_some_and(|p| !p.is_object()) {
        warn!("legacy permissions were not an object; dropping them");
    }

    Ok(Session {
        subject: Subject {
            id,
            subject_type: if is_admin {
                SubjectType::Administrator
            } else {
                SubjectType::Ordinary
            },
            name: text("name"),
            email: text("email"),
        },
        permissions,
        token: SessionToken::new(token),
        second_factor_complete: true,
    })
}
