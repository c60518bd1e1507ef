//! Session, capability and request/response types for the auth flow. Payloads
//! here carry PINs, session tokens and one-time codes, so they must never be
//! logged; `SessionToken` redacts itself in `Debug`.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One named permission unit of the admin UI.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PendingRegistrations,
    SubmittedRegistrations,
    Activities,
    RegistrationPhotos,
    UserManagement,
}

impl Capability {
    pub const ALL: [Self; 5] = [
        Self::PendingRegistrations,
        Self::SubmittedRegistrations,
        Self::Activities,
        Self::RegistrationPhotos,
        Self::UserManagement,
    ];

    /// Capabilities that each unlock one dashboard tab.
    pub const TABS: [Self; 3] = [
        Self::PendingRegistrations,
        Self::SubmittedRegistrations,
        Self::Activities,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingRegistrations => "pending_registrations",
            Self::SubmittedRegistrations => "submitted_registrations",
            Self::Activities => "activities",
            Self::RegistrationPhotos => "registration_photos",
            Self::UserManagement => "user_management",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }
}

/// Capability map as stored and returned by the server.
///
/// Unknown tags are dropped while parsing so a newer server cannot poison an
/// older client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeMap<Capability, bool>);

impl PermissionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, capability: Capability, granted: bool) -> Self {
        self.0.insert(capability, granted);
        self
    }

    /// Raw stored value; administrator overrides are applied by the state machine.
    #[must_use]
    pub fn get(&self, capability: Capability) -> bool {
        self.0.get(&capability).copied().unwrap_or(false)
    }

    pub fn from_tags<'a>(tags: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        Self(
            tags.into_iter()
                .filter_map(|(tag, granted)| Capability::from_tag(tag).map(|c| (c, granted)))
                .collect(),
        )
    }

    #[must_use]
    pub fn to_tags(&self) -> BTreeMap<String, bool> {
        self.0
            .iter()
            .map(|(c, granted)| (c.as_str().to_string(), *granted))
            .collect()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_tags().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, bool>::deserialize(deserializer)?;
        Ok(Self::from_tags(raw.iter().map(|(k, v)| (k.as_str(), *v))))
    }
}

/// Opaque capability string issued by the API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Ordinary,
    Administrator,
}

/// Authenticated subject as returned by the login endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub subject_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Subject {
    pub fn ordinary(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject_type: SubjectType::Ordinary,
            name: None,
            email: None,
        }
    }

    pub fn administrator(id: impl Into<String>) -> Self {
        Self {
            subject_type: SubjectType::Administrator,
            ..Self::ordinary(id)
        }
    }
}

/// In-memory session owned by the auth state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub subject: Subject,
    pub permissions: PermissionSet,
    pub token: SessionToken,
    pub second_factor_complete: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PinLoginRequest {
    pub pin: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginUser {
    #[serde(deserialize_with = "crate::app_lib::api::deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl From<LoginUser> for Subject {
    fn from(user: LoginUser) -> Self {
        Self {
            id: user.id,
            subject_type: if user.is_admin {
                SubjectType::Administrator
            } else {
                SubjectType::Ordinary
            },
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PinLoginResponse {
    pub session_token: SessionToken,
    pub user: LoginUser,
    #[serde(default)]
    pub permissions: PermissionSet,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendCodeRequest {
    pub session_token: SessionToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub email_code: String,
    pub session_token: SessionToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub session_token: SessionToken,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn login_user_accepts_numeric_id() {
        let user: LoginUser =
            serde_json::from_str(r#"{"id": 1017, "name": "Grace", "is_admin": true}"#).unwrap();
        let subject = Subject::from(user);
        assert_eq!(subject.id, "1017");
        assert_eq!(subject.subject_type, SubjectType::Administrator);
    }

    #[test]
    fn permission_set_ignores_unknown_tags() {
        let json = r#"{"pending_registrations": true, "reports": true, "activities": false}"#;
        let set: PermissionSet = serde_json::from_str(json).unwrap();
        assert!(set.get(Capability::PendingRegistrations));
        assert!(!set.get(Capability::Activities));
        assert!(!set.get(Capability::UserManagement));
        assert_eq!(set.to_tags().len(), 2);
    }

    #[test]
    fn session_token_debug_is_redacted() {
        let token = SessionToken::new("secret-token-value");
        assert_eq!(format!("{token:?}"), "SessionToken(***)");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"secret-token-value\"");
    }

    #[test]
    fn login_user_maps_admin_flag() {
        let user = LoginUser {
            id: "u1".to_string(),
            name: Some("Ada".to_string()),
            email: None,
            is_admin: true,
        };
        let subject = Subject::from(user);
        assert_eq!(subject.subject_type, SubjectType::Administrator);
        assert_eq!(subject.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn capability_tags_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_tag(capability.as_str()), Some(capability));
        }
        assert_eq!(Capability::from_tag("unknown"), None);
    }
}
