//! Client wrappers for the intake auth API endpoints. These helpers centralize
//! request shapes for PIN login and the emailed second factor, keeping the
//! controllers free of transport details. None of them may log the PIN, the
//! session token or the one-time code.

use crate::app_lib::{ApiClient, AppError};
use crate::features::auth::types::{
    PinLoginRequest, PinLoginResponse, SendCodeRequest, SessionToken, SessionTokenResponse,
    VerifyCodeRequest,
};
use async_trait::async_trait;
use tracing::instrument;

/// Remote auth operations; implemented by `ApiClient` and by test doubles.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login_pin(&self, pin: &str) -> Result<PinLoginResponse, AppError>;
    async fn send_code(&self, session_token: &SessionToken) -> Result<SessionToken, AppError>;
    async fn verify_code(
        &self,
        code: &str,
        session_token: &SessionToken,
    ) -> Result<SessionToken, AppError>;
    /// Best-effort follow-up after verification.
    async fn mark_email_verified(&self, session_token: &SessionToken) -> Result<(), AppError>;
}

#[async_trait]
impl AuthApi for ApiClient {
    /// Posts the PIN; a 401/403 is reported as an auth failure.
    #[instrument(skip_all)]
    async fn login_pin(&self, pin: &str) -> Result<PinLoginResponse, AppError> {
        let request = PinLoginRequest {
            pin: pin.to_string(),
        };
        self.post_json("/api/admin/login", &request)
            .await
            .map_err(into_auth_error)
    }

    #[instrument(skip_all)]
    async fn send_code(&self, session_token: &SessionToken) -> Result<SessionToken, AppError> {
        let request = SendCodeRequest {
            session_token: session_token.clone(),
        };
        let response: SessionTokenResponse =
            self.post_json("/api/admin/2fa/send-code", &request).await?;
        Ok(response.session_token)
    }

    #[instrument(skip_all)]
    async fn verify_code(
        &self,
        code: &str,
        session_token: &SessionToken,
    ) -> Result<SessionToken, AppError> {
        let request = VerifyCodeRequest {
            email_code: code.to_string(),
            session_token: session_token.clone(),
        };
        let response: SessionTokenResponse = self
            .post_json("/api/admin/2fa/verify", &request)
            .await
            .map_err(into_auth_error)?;
        Ok(response.session_token)
    }

    #[instrument(skip_all)]
    async fn mark_email_verified(&self, session_token: &SessionToken) -> Result<(), AppError> {
        let request = SendCodeRequest {
            session_token: session_token.clone(),
        };
        self.post_json_empty("/api/admin/mark-email-verified", &request)
            .await
    }
}

/// Client errors on credential endpoints mean the credential was rejected.
/// 410 stays a server error so callers can tell an expired code apart.
fn into_auth_error(err: AppError) -> AppError {
    match err {
        AppError::Server { status, detail } if (400..500).contains(&status) && status != 410 => {
            AppError::Auth(detail)
        }
        other => other,
    }
}
