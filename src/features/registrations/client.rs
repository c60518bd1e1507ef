//! Client helpers for the dashboard list and registration endpoints. Paths are
//! centralized here and the backend is assumed to enforce authorization on
//! every call.

use crate::app_lib::{ApiClient, AppError};
use crate::features::registrations::types::{
    ActivityPage, ListKind, ListPage, MutationAction, PageQuery, PhotoResponse, RegistrationPage,
    RegistrationRequest, RegistrationResponse, SummaryCounters,
};
use async_trait::async_trait;
use tracing::instrument;

#[async_trait]
pub trait RegistrationsApi: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<ListPage, AppError>;
    async fn fetch_summary(&self) -> Result<SummaryCounters, AppError>;
    async fn apply(&self, action: MutationAction, id: &str) -> Result<(), AppError>;
    /// Data URL of the registration photo, if one was uploaded.
    async fn fetch_photo(&self, id: &str) -> Result<Option<String>, AppError>;
    async fn register(&self, request: &RegistrationRequest) -> Result<String, AppError>;
}

#[async_trait]
impl RegistrationsApi for ApiClient {
    #[instrument(skip_all, fields(kind = %query.kind, page = query.page))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<ListPage, AppError> {
        let params = query.to_params();
        match query.kind {
            ListKind::Pending | ListKind::Submitted => self
                .get_json::<RegistrationPage>(query.kind.endpoint(), &params)
                .await
                .map(ListPage::from),
            ListKind::Activities => self
                .get_json::<ActivityPage>(query.kind.endpoint(), &params)
                .await
                .map(ListPage::from),
        }
    }

    #[instrument(skip_all)]
    async fn fetch_summary(&self) -> Result<SummaryCounters, AppError> {
        self.get_json("/api/admin-dashboard-summary", &[]).await
    }

    #[instrument(skip(self), fields(action = action.as_str()))]
    async fn apply(&self, action: MutationAction, id: &str) -> Result<(), AppError> {
        let id = registration_id(id)?;
        match action {
            MutationAction::Finalize => {
                self.post_empty(&format!("/api/admin-registration/{id}/finalize"))
                    .await
            }
            MutationAction::Revert => {
                self.post_empty(&format!("/api/admin-registration/{id}/revert-to-pending"))
                    .await
            }
            MutationAction::Delete => self.delete(&format!("/api/admin-registration/{id}")).await,
        }
    }

    #[instrument(skip(self))]
    async fn fetch_photo(&self, id: &str) -> Result<Option<String>, AppError> {
        let id = registration_id(id)?;
        let response: PhotoResponse = self
            .get_json(&format!("/api/admin-registration/{id}/photo"), &[])
            .await?;
        Ok(response.photo.filter(|photo| !photo.is_empty()))
    }

    #[instrument(skip_all)]
    async fn register(&self, request: &RegistrationRequest) -> Result<String, AppError> {
        let response: RegistrationResponse = self.post_json("/api/register", request).await?;
        Ok(response.registration_id)
    }
}

/// Rejects ids that would escape the path segment.
fn registration_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("id", "Registration id is required."));
    }
    if matches!(trimmed, "." | "..") || trimmed.contains(['/', '\\', '?', '#', '%']) {
        return Err(AppError::validation("id", "Registration id is not valid."));
    }
    Ok(trimmed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{RegistrationsApi, registration_id};
    use crate::app_lib::{ApiClient, AppConfig, AppError};
    use crate::features::registrations::types::{
        ListItem, ListKind, MutationAction, PageQuery, RegistrationRequest,
    };
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[test]
    fn ids_that_leave_the_path_segment_are_rejected() {
        assert_eq!(registration_id(" r7 ").unwrap(), "r7");
        for id in ["", "  ", ".", "..", "../finalize", "a/b", "a\\b", "r1?x=1", "r1#", "%2e%2e"] {
            assert!(
                matches!(registration_id(id), Err(AppError::Validation { .. })),
                "{id:?} was accepted"
            );
        }
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&AppConfig::new(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn fetch_activities_uses_activities_envelope() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin-activities-optimized"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "20"))
            .and(query_param("status_filter", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activities": [{ "id": "a1", "description": "Intake call" }],
                "pagination": { "current_page": 1, "total_pages": 3, "total_records": 41 }
            })))
            .mount(&server)
            .await;

        let mut query = PageQuery::new(ListKind::Activities, 1, 20);
        query.filters.insert("status_filter".into(), "open".into());
        let page = client(&server).fetch_page(&query).await.unwrap();
        assert!(matches!(&page.items[0], ListItem::Activity(a) if a.id == "a1"));
        assert_eq!(page.pagination.total_records, 41);
    }

    #[tokio::test]
    async fn revert_posts_to_revert_to_pending() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin-registration/r7/revert-to-pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .apply(MutationAction::Revert, "r7")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn photo_null_is_none() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin-registration/r1/photo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "photo": null })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).fetch_photo("r1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_returns_registration_id() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .and(body_json(json!({
                "full_name": "Ada Lovelace",
                "date_of_birth": "1990-12-10",
                "consent_given": true
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "registration_id": "reg-1" })),
            )
            .mount(&server)
            .await;

        let request = RegistrationRequest {
            full_name: "Ada Lovelace".into(),
            date_of_birth: "1990-12-10".into(),
            consent_given: true,
            ..RegistrationRequest::default()
        };
        assert_eq!(client(&server).register(&request).await.unwrap(), "reg-1");
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected_locally() {
        let client = ApiClient::new(&AppConfig::new("http://127.0.0.1:9").unwrap()).unwrap();
        let result = client.apply(MutationAction::Delete, "../users").await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}
