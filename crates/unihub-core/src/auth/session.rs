//! Session lifecycle and the authenticated request path.
//!
//! `SessionManager` owns the token pair in the credential store and is the
//! only writer of [`SessionState`]. Everything that needs to know whether a
//! user is signed in subscribes to the state channel; everything that calls
//! an authenticated endpoint goes through [`SessionManager::request`], which
//! attaches the bearer token and absorbs expiry by refreshing once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::types::{
    LoginRequest, PasswordResetConfirmRequest, SignupRequest, SignupResponse,
};
use crate::api::{ApiClient, ApiError, AuthApi};
use crate::auth::store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::auth::token;
use crate::models::UserProfile;

/// How long a "remember me" refresh credential is retained, in days.
/// Matches the server-side refresh token lifetime, so the stored value
/// does not outlive its usefulness.
pub const REMEMBER_RETENTION_DAYS: u32 = 30;

// ============================================================================
// Session state
// ============================================================================

/// Where the session stands. Starts at `Uninitialized`; `initialize` moves
/// through `Checking` and settles on one of the two terminal states. After
/// that, only sign-in, sign-out, and refresh outcomes move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No startup check has run yet.
    Uninitialized,
    /// The startup check is in progress.
    Checking,
    Authenticated,
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Checking => "checking",
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Session manager
// ============================================================================

/// Drives sign-in, sign-out, and token refresh against the UniHub API.
///
/// Generic over [`AuthApi`] so tests can script the server side; production
/// code uses it with [`ApiClient`].
pub struct SessionManager<A = ApiClient> {
    api: Arc<A>,
    store: Arc<CredentialStore>,
    state_tx: watch::Sender<SessionState>,
    /// Count of completed refresh flights. Snapshotted before waiting on
    /// `refresh_gate`; a change while waiting means another caller's flight
    /// already settled this token generation.
    refresh_epoch: AtomicU64,
    /// Held for the duration of a refresh network call.
    refresh_gate: Mutex<()>,
    /// Serializes `initialize` so the startup check runs at most once.
    init_gate: Mutex<()>,
}

impl<A: AuthApi> SessionManager<A> {
    pub fn new(api: Arc<A>, store: Arc<CredentialStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            api,
            store,
            state_tx,
            refresh_epoch: AtomicU64::new(0),
            refresh_gate: Mutex::new(()),
            init_gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// True only while the startup check is still resolving.
    pub fn is_checking(&self) -> bool {
        self.state() == SessionState::Checking
    }

    /// Subscribe to session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: SessionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %*state, to = %next, "Session state change");
            *state = next;
            true
        });
    }

    /// A usable access token, if one is stored and inside its lifetime.
    /// An expired token is deleted on observation rather than returned.
    pub fn access_token(&self) -> Option<String> {
        let access = self.store.get(ACCESS_TOKEN_KEY)?;
        if token::is_expired(&access) {
            debug!("Stored access token expired, discarding");
            self.store.delete(ACCESS_TOKEN_KEY);
            return None;
        }
        Some(access)
    }

    /// Expiry of the stored access token, for status displays.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        token::expires_at(&self.store.get(ACCESS_TOKEN_KEY)?)
    }

    /// Whether a refresh credential is stored. A local read, so status
    /// displays can tell "signed out" from "signed in, access expired"
    /// without spending the refresh attempt.
    pub fn has_refresh_credential(&self) -> bool {
        self.store.get(REFRESH_TOKEN_KEY).is_some()
    }

    /// Resolve the stored credentials into a definite session state.
    ///
    /// Runs the full check at most once; later calls return the settled
    /// state. A terminal state is published only once the check has fully
    /// resolved, including the single refresh attempt when one is needed.
    pub async fn initialize(&self) -> SessionState {
        let _gate = self.init_gate.lock().await;
        if self.state() != SessionState::Uninitialized {
            return self.state();
        }
        self.set_state(SessionState::Checking);

        if let Some(access) = self.store.get(ACCESS_TOKEN_KEY) {
            if !token::is_expired(&access) {
                debug!("Stored access token still valid, session restored");
                self.set_state(SessionState::Authenticated);
                return SessionState::Authenticated;
            }
            debug!("Stored access token expired, discarding");
            self.store.delete(ACCESS_TOKEN_KEY);
        }

        if self.store.get(REFRESH_TOKEN_KEY).is_some() {
            match self.refresh().await {
                Ok(()) => info!("Session restored by refresh"),
                Err(error) => debug!(%error, "Could not restore session"),
            }
        } else {
            debug!("No stored credentials");
            self.set_state(SessionState::Unauthenticated);
        }
        self.state()
    }

    /// Sign in with email and password.
    ///
    /// On success the token pair is stored - the refresh credential for
    /// [`REMEMBER_RETENTION_DAYS`] when `remember` is set, otherwise for
    /// the session only - and the account profile from the response is
    /// returned. On failure nothing is stored and the state is untouched.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<UserProfile, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&request).await?;

        self.store.set(ACCESS_TOKEN_KEY, &response.access, None);
        let retention = remember.then_some(REMEMBER_RETENTION_DAYS);
        self.store.set(REFRESH_TOKEN_KEY, &response.refresh, retention);
        self.set_state(SessionState::Authenticated);
        info!(email = %email, remember, "Signed in");
        Ok(response.user)
    }

    /// Sign out locally. Tokens are deleted and the state flips to
    /// unauthenticated; safe to call when already signed out.
    pub fn logout(&self) {
        self.store.delete(ACCESS_TOKEN_KEY);
        self.store.delete(REFRESH_TOKEN_KEY);
        self.set_state(SessionState::Unauthenticated);
        info!("Signed out");
    }

    /// Register a new account. Validation problems come back as
    /// [`ApiError::Validation`] with per-field messages.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, ApiError> {
        let response = self.api.signup(request).await?;
        info!(email = %response.email, "Account created, verification pending");
        Ok(response)
    }

    /// Confirm the emailed one-time code for a fresh account.
    ///
    /// The server replies with a token pair, but verification is not a
    /// sign-in: the tokens are dropped and the caller still goes through
    /// [`login`](Self::login).
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<String, ApiError> {
        let response = self.api.verify_otp(email, otp).await?;
        info!(email = %email, "Account verified");
        Ok(response.message)
    }

    /// Ask the server to email a password reset link. Touches neither
    /// credentials nor session state.
    pub async fn request_password_reset(&self, email: &str) -> Result<String, ApiError> {
        let response = self.api.request_password_reset(email).await?;
        info!(email = %email, "Password reset requested");
        Ok(response.message)
    }

    /// Complete a password reset with the uid and token from the emailed
    /// link. Like signup and verification, this does not sign the user in.
    pub async fn confirm_password_reset(
        &self,
        request: &PasswordResetConfirmRequest,
    ) -> Result<String, ApiError> {
        let response = self.api.confirm_password_reset(request).await?;
        info!("Password reset confirmed");
        Ok(response.message)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Obtain a fresh access token from the stored refresh credential.
    ///
    /// At most one network attempt is made, and a failed attempt ends the
    /// session. Callers that arrive while another refresh is in flight wait
    /// for it and share its outcome instead of issuing their own request.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let seen = self.refresh_epoch.load(Ordering::Acquire);
        let _flight = self.refresh_gate.lock().await;
        if self.refresh_epoch.load(Ordering::Acquire) != seen {
            // Another caller refreshed while we waited; adopt its outcome.
            return if self.access_token().is_some() {
                debug!("Adopting concurrent refresh result");
                Ok(())
            } else {
                Err(ApiError::RefreshFailed {
                    reason: "concurrent refresh attempt failed".to_string(),
                })
            };
        }

        let result = self.try_refresh().await;
        self.refresh_epoch.fetch_add(1, Ordering::Release);
        result
    }

    async fn try_refresh(&self) -> Result<(), ApiError> {
        let Some(refresh_token) = self.store.get(REFRESH_TOKEN_KEY) else {
            self.end_session("no refresh credential");
            return Err(ApiError::RefreshFailed {
                reason: "no refresh credential".to_string(),
            });
        };

        match self.api.refresh(&refresh_token).await {
            Ok(response) => {
                self.store.set(ACCESS_TOKEN_KEY, &response.access, None);
                self.set_state(SessionState::Authenticated);
                info!("Access token refreshed");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "Token refresh rejected, ending session");
                self.end_session("refresh rejected");
                Err(ApiError::RefreshFailed {
                    reason: error.to_string(),
                })
            }
        }
    }

    fn end_session(&self, why: &str) {
        debug!(why, "Clearing stored credentials");
        self.store.delete(ACCESS_TOKEN_KEY);
        self.store.delete(REFRESH_TOKEN_KEY);
        self.set_state(SessionState::Unauthenticated);
    }

    // ========================================================================
    // Authenticated requests
    // ========================================================================

    /// Run an authenticated API call with automatic token refresh.
    ///
    /// The operation receives a bearer token and is invoked at most twice:
    /// once with the current token, and once more with a refreshed token if
    /// the first try came back 401. A missing or expired stored token counts
    /// as that first 401. Refresh failures propagate immediately.
    pub async fn request<T, F, Fut>(&self, operation: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retried = false;
        loop {
            let access = match self.access_token() {
                Some(access) => access,
                None if retried => return Err(ApiError::Unauthorized),
                None => {
                    debug!("No usable access token, refreshing before first try");
                    retried = true;
                    self.refresh().await?;
                    continue;
                }
            };

            match operation(access).await {
                Err(ApiError::Unauthorized) if !retried => {
                    debug!("Got 401, refreshing and replaying once");
                    retried = true;
                    self.refresh().await?;
                }
                result => return result,
            }
        }
    }
}
