use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dashboard list backed by one paginated endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListKind {
    Pending,
    Submitted,
    Activities,
}

impl ListKind {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Submitted, Self::Activities];

    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Pending => "/api/admin-registrations-pending-optimized",
            Self::Submitted => "/api/admin-registrations-submitted-optimized",
            Self::Activities => "/api/admin-activities-optimized",
        }
    }

    /// Query fields the endpoint understands; anything else is dropped.
    #[must_use]
    pub fn filter_fields(self) -> &'static [&'static str] {
        match self {
            Self::Pending | Self::Submitted => &[
                "search_name",
                "search_date",
                "search_disposition",
                "search_referral_site",
            ],
            Self::Activities => &["search_term", "search_date", "status_filter"],
        }
    }

    #[must_use]
    pub fn is_registration_list(self) -> bool {
        !matches!(self, Self::Activities)
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Activities => "activities",
        })
    }
}

impl std::str::FromStr for ListKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "activities" => Ok(Self::Activities),
            other => Err(format!("unknown list: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(deserialize_with = "crate::app_lib::api::deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub health_card_number: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub disposition: Option<String>,
    #[serde(default)]
    pub referral_site: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(deserialize_with = "crate::app_lib::api::deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Row of any dashboard list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListItem {
    Registration(Registration),
    Activity(Activity),
}

impl ListItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Registration(registration) => &registration.id,
            Self::Activity(activity) => &activity.id,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_records: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationPage {
    #[serde(default)]
    pub data: Vec<Registration>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Normalized page of either list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    pub pagination: Pagination,
}

impl From<RegistrationPage> for ListPage {
    fn from(page: RegistrationPage) -> Self {
        Self {
            items: page.data.into_iter().map(ListItem::Registration).collect(),
            pagination: page.pagination,
        }
    }
}

impl From<ActivityPage> for ListPage {
    fn from(page: ActivityPage) -> Self {
        Self {
            items: page.activities.into_iter().map(ListItem::Activity).collect(),
            pagination: page.pagination,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub kind: ListKind,
    pub page: u32,
    pub page_size: u32,
    pub filters: BTreeMap<String, String>,
}

impl PageQuery {
    #[must_use]
    pub fn new(kind: ListKind, page: u32, page_size: u32) -> Self {
        Self {
            kind,
            page: page.max(1),
            page_size,
            filters: BTreeMap::new(),
        }
    }

    /// Query string pairs; blank filters and fields the endpoint does not
    /// accept are left out.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        let allowed = self.kind.filter_fields();
        params.extend(
            self.filters
                .iter()
                .filter(|(field, value)| {
                    allowed.contains(&field.as_str()) && !value.trim().is_empty()
                })
                .map(|(field, value)| (field.clone(), value.trim().to_string())),
        );
        params
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounters {
    #[serde(default, rename = "pending_count")]
    pub pending: u64,
    #[serde(default, rename = "submitted_count")]
    pub submitted: u64,
    #[serde(default, rename = "activities_count")]
    pub activities: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationAction {
    Finalize,
    Revert,
    Delete,
}

impl MutationAction {
    /// List the item must currently be on.
    #[must_use]
    pub fn accepts_source(self, kind: ListKind) -> bool {
        match self {
            Self::Finalize => kind == ListKind::Pending,
            Self::Revert => kind == ListKind::Submitted,
            Self::Delete => kind.is_registration_list(),
        }
    }

    /// List the item lands on after the server confirms.
    #[must_use]
    pub fn destination(self) -> Option<ListKind> {
        match self {
            Self::Finalize => Some(ListKind::Submitted),
            Self::Revert => Some(ListKind::Pending),
            Self::Delete => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finalize => "finalize",
            Self::Revert => "revert",
            Self::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PhotoResponse {
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub full_name: String,
    pub date_of_birth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_card_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub consent_given: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationResponse {
    pub registration_id: String,
}
