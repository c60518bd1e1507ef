//! HTTP helpers for the intake JSON API with consistent timeouts and error
//! handling. Feature clients build on these helpers so request setup, error
//! mapping and body sanitizing live in one place. The helpers never log
//! request bodies; session tokens and codes travel inside them.

use super::{config::AppConfig, errors::AppError};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};
use ulid::Ulid;

/// Maximum number of error body characters surfaced to the UI.
const MAX_ERROR_CHARS: usize = 200;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Reads an id the server may send as a JSON string or integer.
///
/// # Errors
/// Fails for any other JSON type.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Signed(id) => id.to_string(),
        RawId::Unsigned(id) => id.to_string(),
    })
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    bearer: Option<String>,
}

impl ApiClient {
    /// Builds a client bound to the configured API base URL.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the underlying HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AppError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            bearer: None,
        })
    }

    /// Returns a copy that sends `Authorization: Bearer <token>` on every
    /// request. Dashboard endpoints require the verified session token.
    #[must_use]
    pub fn with_bearer_token(&self, token: &str) -> Self {
        let mut client = self.clone();
        client.bearer = Some(token.to_string()).filter(|token| !token.is_empty());
        client
    }

    /// Fetches JSON with optional query parameters.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let request = self.request(Method::GET, path).query(query);
        let response = send(request).await?;
        handle_json_response(response).await
    }

    /// Posts JSON and parses a JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let request = self.request(Method::POST, path).json(body);
        let response = send(request).await?;
        handle_json_response(response).await
    }

    /// Posts JSON and ignores the response body.
    pub async fn post_json_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), AppError> {
        let request = self.request(Method::POST, path).json(body);
        let response = send(request).await?;
        handle_empty_response(response).await
    }

    /// Posts an empty body, used by registration state changes.
    pub async fn post_empty(&self, path: &str) -> Result<(), AppError> {
        let request = self.request(Method::POST, path);
        let response = send(request).await?;
        handle_empty_response(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), AppError> {
        let request = self.request(Method::DELETE, path);
        let response = send(request).await?;
        handle_empty_response(response).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = build_url(&self.base_url, path);
        let request = self
            .http
            .request(method, url)
            .header("X-Request-Id", Ulid::new().to_string());
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("bearer", &self.bearer.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

/// Builds a URL from an explicit base URL and the provided path.
pub fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

#[instrument(skip_all)]
async fn send(request: RequestBuilder) -> Result<Response, AppError> {
    let response = request.send().await.map_err(map_request_error)?;
    debug!(status = response.status().as_u16(), url = %response.url().path(), "response");
    Ok(response)
}

/// Maps transport failures into network or timeout errors.
fn map_request_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        warn!("request failed: {err}");
        AppError::Network(format!("Unable to reach the server: {err}"))
    }
}

/// Parses JSON responses and surfaces HTTP errors with sanitized bodies.
async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Parse(format!("Failed to decode response: {err}")))
    } else {
        Err(error_from_response(response).await)
    }
}

/// Handles empty responses and returns sanitized HTTP errors when needed.
async fn handle_empty_response(response: Response) -> Result<(), AppError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Server {
        status: status.as_u16(),
        detail: extract_detail(status, &body),
    }
}

/// Prefers the JSON `detail` field, then the raw body, then a generic message.
fn extract_detail(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("detail")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match detail {
        Some(detail) => sanitize_body(&detail, status),
        None => sanitize_body(body, status),
    }
}

/// Sanitizes HTTP error bodies for user-facing messages by trimming and truncating.
fn sanitize_body(body: &str, status: StatusCode) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| "Request failed.".to_string(), |r| format!("{r}."))
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
