//! Client configuration. Values arrive from CLI arguments or their environment
//! fallbacks and are normalized here so the rest of the crate never sees blank
//! strings. Configuration values are not secret, with the exception of the
//! development bypass code which must never be set in production.

use super::errors::AppError;
use std::{path::PathBuf, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SESSION_FILE: &str = ".intake-session.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" => Ok(Self::Development),
            other => Err(AppError::Config(format!("unknown environment: {other}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: String,
    pub environment: Environment,
    pub dev_bypass_code: Option<String>,
    pub page_size: u32,
    pub debounce: Duration,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
}

impl AppConfig {
    /// Builds a config for the given API base URL with default tuning.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the URL is empty or not http(s).
    pub fn new(api_base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            api_base_url: validate_base_url(api_base_url)?,
            environment: Environment::Production,
            dev_bypass_code: None,
            page_size: DEFAULT_PAGE_SIZE,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
        })
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_dev_bypass_code(mut self, code: Option<&str>) -> Self {
        self.dev_bypass_code = code.and_then(normalize_value);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = path;
        self
    }

    /// Bypass code usable by the second-factor flow, if any.
    /// Always `None` outside development.
    #[must_use]
    pub fn effective_bypass_code(&self) -> Option<&str> {
        if self.environment.is_production() {
            None
        } else {
            self.dev_bypass_code.as_deref()
        }
    }
}

fn validate_base_url(raw: &str) -> Result<String, AppError> {
    let value = normalize_value(raw)
        .ok_or_else(|| AppError::Config("API base URL is not configured.".to_string()))?;
    let parsed =
        Url::parse(&value).map_err(|err| AppError::Config(format!("invalid API URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "invalid API URL scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Trims the value and drops it when empty.
pub fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
