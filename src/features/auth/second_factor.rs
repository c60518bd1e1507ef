//! Emailed one-time code flow for operator login.
//!
//! Flow Overview:
//! 1) `send` requests a code and starts a 60 second countdown; a resend
//!    supersedes the previous challenge and restarts the countdown.
//! 2) `verify` checks the code shape locally, asks the server, and on success
//!    promotes the auth state machine to fully authenticated.
//! 3) The countdown only gates resending. The server decides when a code has
//!    expired.
//!
//! The controller never holds its lock across a network call, so a second
//! `send` issued while the first is in flight observes `sending` and returns.

use crate::app_lib::{AppConfig, AppError};
use crate::features::auth::{client::AuthApi, state::SharedAuth, types::SessionToken};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

pub const CODE_LENGTH: usize = 6;
pub const COUNTDOWN_SECONDS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengePhase {
    NoChallenge,
    Sent,
    Verified,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondFactorChallenge {
    pub owner: SessionToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_open: bool,
}

/// Snapshot handed to the view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeStatus {
    pub phase: ChallengePhase,
    pub challenge: Option<SecondFactorChallenge>,
    pub countdown_seconds: u64,
    pub sending: bool,
    pub entered_code: String,
}

impl ChallengeStatus {
    #[must_use]
    pub fn can_resend(&self) -> bool {
        !self.sending && self.countdown_seconds == 0 && self.phase != ChallengePhase::Verified
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SecondFactorError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("A new code can be requested in {remaining_seconds}s")]
    ResendThrottled { remaining_seconds: u64 },
}

struct Inner {
    phase: ChallengePhase,
    challenge: Option<SecondFactorChallenge>,
    countdown: u64,
    sending: bool,
    entered_code: String,
    ticker: Option<JoinHandle<()>>,
    ticker_generation: u64,
}

impl Inner {
    fn status(&self) -> ChallengeStatus {
        ChallengeStatus {
            phase: self.phase,
            challenge: self.challenge.clone(),
            countdown_seconds: self.countdown,
            sending: self.sending,
            entered_code: self.entered_code.clone(),
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

pub struct SecondFactorController {
    api: Arc<dyn AuthApi>,
    auth: SharedAuth,
    inner: Arc<Mutex<Inner>>,
    bypass_code: Option<String>,
}

impl SecondFactorController {
    pub fn new(api: Arc<dyn AuthApi>, auth: SharedAuth) -> Self {
        Self {
            api,
            auth,
            inner: Arc::new(Mutex::new(Inner {
                phase: ChallengePhase::NoChallenge,
                challenge: None,
                countdown: 0,
                sending: false,
                entered_code: String::new(),
                ticker: None,
                ticker_generation: 0,
            })),
            bypass_code: None,
        }
    }

    /// Accepts the configured bypass code locally; production configs never
    /// yield one.
    #[must_use]
    pub fn with_dev_bypass(mut self, config: &AppConfig) -> Self {
        self.bypass_code = config.effective_bypass_code().map(str::to_string);
        self
    }

    #[must_use]
    pub fn status(&self) -> ChallengeStatus {
        self.lock().status()
    }

    /// Records what the operator typed, for views that bind the input.
    pub fn set_entered_code(&self, code: &str) {
        self.lock().entered_code = code.to_string();
    }

    /// Requests a new code for `session_token`.
    ///
    /// Returns the current status without a network call while a send is in
    /// flight.
    ///
    /// # Errors
    /// `ResendThrottled` while the countdown of the active challenge runs,
    /// `AppError::Transition` once the challenge was verified, and the API
    /// error when the request fails.
    pub async fn send(
        &self,
        session_token: &SessionToken,
    ) -> Result<ChallengeStatus, SecondFactorError> {
        {
            let mut inner = self.lock();
            if inner.sending {
                debug!("send ignored: request already in flight");
                return Ok(inner.status());
            }
            if inner.phase == ChallengePhase::Verified {
                let err = AppError::Transition {
                    from: "verified",
                    operation: "send code",
                };
                error!("{err}");
                return Err(err.into());
            }
            if inner.phase == ChallengePhase::Sent && inner.countdown > 0 {
                return Err(SecondFactorError::ResendThrottled {
                    remaining_seconds: inner.countdown,
                });
            }
            inner.sending = true;
        }

        let result = self.api.send_code(session_token).await;

        let mut inner = self.lock();
        inner.sending = false;
        let owner = match result {
            Ok(owner) if !owner.is_empty() => owner,
            Ok(_) => session_token.clone(),
            Err(err) => {
                warn!("failed to send verification code: {err}");
                return Err(err.into());
            }
        };

        let issued_at = Utc::now();
        inner.challenge = Some(SecondFactorChallenge {
            owner,
            issued_at,
            expires_at: issued_at + ChronoDuration::seconds(COUNTDOWN_SECONDS as i64),
            attempts_open: true,
        });
        inner.phase = ChallengePhase::Sent;
        inner.countdown = COUNTDOWN_SECONDS;
        inner.entered_code.clear();
        inner.stop_ticker();
        inner.ticker_generation += 1;
        inner.ticker = Some(tokio::spawn(run_countdown(
            Arc::downgrade(&self.inner),
            inner.ticker_generation,
        )));
        info!("verification code sent");
        Ok(inner.status())
    }

    /// Verifies `code` and completes the login on success.
    ///
    /// # Errors
    /// `AppError::Validation` when the code is not six digits (no network call),
    /// `AppError::Transition` when there is no session awaiting a second factor,
    /// and `AppError::Auth`/`Server`/`Network` from the verifier. Remote
    /// failures clear the entered code but keep the challenge and countdown.
    pub async fn verify(
        &self,
        code: &str,
        session_token: &SessionToken,
    ) -> Result<(), SecondFactorError> {
        let code = code.trim();
        self.set_entered_code(code);

        if !is_valid_code(code) {
            return Err(AppError::validation("email_code", "Enter the 6-digit code.").into());
        }

        {
            let auth = self.auth.lock().await;
            if auth.session().is_none() {
                let err = AppError::Transition {
                    from: auth.state().name(),
                    operation: "verify second factor",
                };
                error!("{err}");
                return Err(err.into());
            }
        }

        let token = if self.bypass_code.as_deref() == Some(code) {
            warn!("development bypass code accepted for second factor");
            session_token.clone()
        } else {
            match self.api.verify_code(code, session_token).await {
                Ok(token) => token,
                Err(err) => {
                    self.record_failure(&err);
                    return Err(err.into());
                }
            }
        };

        self.auth
            .lock()
            .await
            .complete_second_factor(token.clone())?;

        {
            let mut inner = self.lock();
            inner.phase = ChallengePhase::Verified;
            inner.entered_code.clear();
            inner.countdown = 0;
            inner.stop_ticker();
            if let Some(challenge) = inner.challenge.as_mut() {
                challenge.attempts_open = false;
            }
        }

        if let Err(err) = self.api.mark_email_verified(&token).await {
            warn!("failed to mark email verified: {err}");
        }
        Ok(())
    }

    fn record_failure(&self, err: &AppError) {
        let mut inner = self.lock();
        inner.entered_code.clear();
        if is_expired(err) {
            inner.phase = ChallengePhase::Expired;
            if let Some(challenge) = inner.challenge.as_mut() {
                challenge.attempts_open = false;
            }
        }
        debug!("verification failed: {err}");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SecondFactorController {
    fn drop(&mut self) {
        self.lock().stop_ticker();
    }
}

/// Exactly six ASCII digits.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

fn is_expired(err: &AppError) -> bool {
    match err {
        AppError::Server { status: 410, .. } => true,
        AppError::Server { detail, .. } | AppError::Auth(detail) => {
            detail.to_lowercase().contains("expired")
        }
        _ => false,
    }
}

/// Decrements the countdown once per second until it reaches zero or a newer
/// challenge replaces this ticker.
async fn run_countdown(inner: Weak<Mutex<Inner>>, generation: u64) {
    let period = Duration::from_secs(1);
    let mut ticks = interval_at(Instant::now() + period, period);
    loop {
        ticks.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.ticker_generation != generation {
            return;
        }
        inner.countdown = inner.countdown.saturating_sub(1);
        if inner.countdown == 0 {
            inner.ticker = None;
            debug!("resend enabled");
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::app_lib::Environment;
    use crate::features::auth::{
        state::{AccessPredicates, AuthStateMachine},
        storage::{MemoryStorage, PersistedSessionStore},
        types::{PermissionSet, PinLoginResponse, Subject},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeAuthApi {
        sends: AtomicUsize,
        verifies: AtomicUsize,
        marks: AtomicUsize,
        fail_mark: bool,
    }

    #[async_trait]
    impl AuthApi for FakeAuthApi {
        async fn login_pin(&self, _pin: &str) -> Result<PinLoginResponse, AppError> {
            Err(AppError::Auth("unused".to_string()))
        }

        async fn send_code(&self, token: &SessionToken) -> Result<SessionToken, AppError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(token.clone())
        }

        async fn verify_code(
            &self,
            code: &str,
            _token: &SessionToken,
        ) -> Result<SessionToken, AppError> {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            match code {
                "246810" => Ok(SessionToken::new("full-token")),
                "999999" => Err(AppError::Server {
                    status: 410,
                    detail: "Code expired".to_string(),
                }),
                _ => Err(AppError::Auth("Invalid verification code".to_string())),
            }
        }

        async fn mark_email_verified(&self, _token: &SessionToken) -> Result<(), AppError> {
            self.marks.fetch_add(1, Ordering::SeqCst);
            if self.fail_mark {
                Err(AppError::Network("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn pending_auth() -> SharedAuth {
        let mut machine = AuthStateMachine::new(PersistedSessionStore::new(MemoryStorage::new()));
        machine.restore();
        machine.login_primary(
            Subject::ordinary("u1"),
            PermissionSet::new(),
            SessionToken::new("pending"),
        );
        machine.shared()
    }

    fn controller(api: Arc<FakeAuthApi>, auth: SharedAuth) -> SecondFactorController {
        SecondFactorController::new(api, auth)
    }

    #[test]
    fn code_shape() {
        assert!(is_valid_code("012345"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("1234567"));
        assert!(!is_valid_code("12a456"));
        assert!(!is_valid_code("１２３４５６"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sends_issue_one_request() {
        let api = Arc::new(FakeAuthApi::default());
        let ctrl = controller(api.clone(), pending_auth());
        let token = SessionToken::new("pending");

        let (first, second) = tokio::join!(ctrl.send(&token), ctrl.send(&token));
        assert_eq!(api.sends.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().phase, ChallengePhase::Sent);
        assert_eq!(second.unwrap().phase, ChallengePhase::NoChallenge);
        assert!(ctrl.status().challenge.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn send_sets_sixty_second_challenge_and_throttles_resend() {
        let api = Arc::new(FakeAuthApi::default());
        let ctrl = controller(api.clone(), pending_auth());
        let token = SessionToken::new("pending");

        let status = ctrl.send(&token).await.unwrap();
        assert_eq!(status.countdown_seconds, 60);
        assert!(!status.can_resend());
        let challenge = status.challenge.unwrap();
        assert_eq!(
            challenge.expires_at - challenge.issued_at,
            ChronoDuration::seconds(60)
        );

        let result = ctrl.send(&token).await;
        assert_eq!(
            result.err(),
            Some(SecondFactorError::ResendThrottled {
                remaining_seconds: 60
            })
        );
        assert_eq!(api.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_zero_and_reenables_resend() {
        let api = Arc::new(FakeAuthApi::default());
        let ctrl = controller(api.clone(), pending_auth());
        let token = SessionToken::new("pending");
        ctrl.send(&token).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(ctrl.status().countdown_seconds, 50);

        tokio::time::sleep(Duration::from_secs(50)).await;
        let status = ctrl.status();
        assert_eq!(status.countdown_seconds, 0);
        assert!(status.can_resend());
        // The challenge itself is still open; the server decides expiry.
        assert_eq!(status.phase, ChallengePhase::Sent);

        let first_issue = status.challenge.unwrap().issued_at;
        let resent = ctrl.send(&token).await.unwrap();
        assert_eq!(api.sends.load(Ordering::SeqCst), 2);
        assert_eq!(resent.countdown_seconds, 60);
        assert!(resent.challenge.unwrap().issued_at >= first_issue);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_code_never_reaches_the_network() {
        let api = Arc::new(FakeAuthApi::default());
        let ctrl = controller(api.clone(), pending_auth());
        let result = ctrl.verify("12ab", &SessionToken::new("pending")).await;
        assert!(matches!(
            result,
            Err(SecondFactorError::App(AppError::Validation { .. }))
        ));
        assert_eq!(api.verifies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_code_clears_input_but_keeps_challenge() {
        let api = Arc::new(FakeAuthApi::default());
        let auth = pending_auth();
        let ctrl = controller(api.clone(), auth.clone());
        let token = SessionToken::new("pending");
        ctrl.send(&token).await.unwrap();

        let result = ctrl.verify("000000", &token).await;
        assert_eq!(
            result.err(),
            Some(SecondFactorError::App(AppError::Auth(
                "Invalid verification code".to_string()
            )))
        );
        let status = ctrl.status();
        assert_eq!(status.entered_code, "");
        assert_eq!(status.phase, ChallengePhase::Sent);
        assert_eq!(status.countdown_seconds, 60);
        assert!(auth.lock().await.is_pending_second_factor());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_code_marks_challenge_expired() {
        let api = Arc::new(FakeAuthApi::default());
        let ctrl = controller(api.clone(), pending_auth());
        let token = SessionToken::new("pending");
        ctrl.send(&token).await.unwrap();

        assert!(ctrl.verify("999999", &token).await.is_err());
        let status = ctrl.status();
        assert_eq!(status.phase, ChallengePhase::Expired);
        assert!(!status.challenge.unwrap().attempts_open);
    }

    #[tokio::test(start_paused = true)]
    async fn correct_code_completes_login_even_if_mark_fails() {
        let api = Arc::new(FakeAuthApi {
            fail_mark: true,
            ..FakeAuthApi::default()
        });
        let auth = pending_auth();
        let ctrl = controller(api.clone(), auth.clone());
        let token = SessionToken::new("pending");
        ctrl.send(&token).await.unwrap();

        ctrl.verify("246810", &token).await.unwrap();
        let machine = auth.lock().await;
        assert!(machine.is_fully_authenticated());
        assert_eq!(machine.session().unwrap().token.expose(), "full-token");
        assert_eq!(api.marks.load(Ordering::SeqCst), 1);
        assert_eq!(ctrl.status().phase, ChallengePhase::Verified);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_without_pending_session_is_a_transition_error() {
        let api = Arc::new(FakeAuthApi::default());
        let mut machine = AuthStateMachine::new(PersistedSessionStore::new(MemoryStorage::new()));
        machine.restore();
        let ctrl = controller(api.clone(), machine.shared());

        let result = ctrl.verify("246810", &SessionToken::new("x")).await;
        assert!(matches!(
            result,
            Err(SecondFactorError::App(AppError::Transition { .. }))
        ));
        assert_eq!(api.verifies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_code_only_works_in_development() {
        let api = Arc::new(FakeAuthApi::default());
        let token = SessionToken::new("pending");

        let config = AppConfig::new("http://localhost:8080")
            .unwrap()
            .with_dev_bypass_code(Some("111111"));

        let prod = controller(api.clone(), pending_auth())
            .with_dev_bypass(&config.clone().with_environment(Environment::Production));
        assert!(prod.verify("111111", &token).await.is_err());
        assert_eq!(api.verifies.load(Ordering::SeqCst), 1);

        let auth = pending_auth();
        let dev = controller(api.clone(), auth.clone())
            .with_dev_bypass(&config.with_environment(Environment::Development));
        dev.verify("111111", &token).await.unwrap();
        assert_eq!(api.verifies.load(Ordering::SeqCst), 1);
        assert!(auth.lock().await.is_fully_authenticated());
    }
}
