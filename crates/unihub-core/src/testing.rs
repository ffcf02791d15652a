//! Test doubles and fixture builders shared by the unit tests.
//!
//! `StubApi` implements [`AuthApi`](crate::api::AuthApi) from scripted
//! per-endpoint result queues, so session and cache behavior can be tested
//! without a server. Popping an empty queue panics: a call the test did not
//! script is a test failure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::api::types::{
    LoginRequest, LoginResponse, MessageResponse, OtpVerifyResponse, PasswordResetConfirmRequest,
    RefreshResponse, SignupRequest, SignupResponse,
};
use crate::api::{ApiError, AuthApi};
use crate::models::{ProfileUpdate, UserProfile};

/// Build a structurally valid JWT with the given expiry claim. The signature
/// segment is junk; nothing client-side ever checks it.
pub fn forge_jwt(expires: DateTime<Utc>, user_id: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = match user_id {
        Some(id) => format!(r#"{{"exp":{},"user_id":{}}}"#, expires.timestamp(), id),
        None => format!(r#"{{"exp":{}}}"#, expires.timestamp()),
    };
    format!(
        "{}.{}.forgedsig",
        header,
        URL_SAFE_NO_PAD.encode(claims.as_bytes())
    )
}

/// A token that is comfortably inside its lifetime.
pub fn future_token() -> String {
    forge_jwt(Utc::now() + chrono::Duration::minutes(10), Some(1))
}

/// A token whose expiry has already passed.
pub fn expired_token() -> String {
    forge_jwt(Utc::now() - chrono::Duration::minutes(10), Some(1))
}

pub fn sample_profile() -> UserProfile {
    UserProfile {
        id: 1,
        email: "ada@example.edu".to_string(),
        username: "ada".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        date_of_birth: None,
        academic_year: Some(2),
    }
}

/// A successful login payload: fresh token pair plus the sample profile.
pub fn login_response() -> LoginResponse {
    LoginResponse {
        refresh: forge_jwt(Utc::now() + chrono::Duration::days(30), Some(1)),
        access: future_token(),
        user: sample_profile(),
    }
}

/// A filled-in registration form for the sample user.
pub fn signup_request() -> SignupRequest {
    SignupRequest {
        email: "ada@example.edu".to_string(),
        username: "ada".to_string(),
        password: "hunter2hunter2".to_string(),
        password2: "hunter2hunter2".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        date_of_birth: None,
        academic_year: Some(2),
    }
}

/// Scripted [`AuthApi`] implementation. Each endpoint pops its next result
/// from a queue; call counters record how often the "network" was hit.
#[derive(Default)]
pub struct StubApi {
    pub login_results: Mutex<VecDeque<Result<LoginResponse, ApiError>>>,
    pub refresh_results: Mutex<VecDeque<Result<RefreshResponse, ApiError>>>,
    pub signup_results: Mutex<VecDeque<Result<SignupResponse, ApiError>>>,
    pub otp_results: Mutex<VecDeque<Result<OtpVerifyResponse, ApiError>>>,
    pub profile_results: Mutex<VecDeque<Result<UserProfile, ApiError>>>,
    pub update_results: Mutex<VecDeque<Result<UserProfile, ApiError>>>,
    pub message_results: Mutex<VecDeque<Result<MessageResponse, ApiError>>>,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub update_calls: AtomicUsize,

    /// Artificial latency before refresh responses, for overlap tests.
    pub refresh_delay: Option<Duration>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_login(&self, result: Result<LoginResponse, ApiError>) {
        self.login_results.lock().unwrap().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<RefreshResponse, ApiError>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn push_profile(&self, result: Result<UserProfile, ApiError>) {
        self.profile_results.lock().unwrap().push_back(result);
    }

    pub fn push_update(&self, result: Result<UserProfile, ApiError>) {
        self.update_results.lock().unwrap().push_back(result);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn profile_count(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

impl AuthApi for StubApi {
    async fn login(&self, _req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted login call")
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        self.refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted refresh call")
    }

    async fn signup(&self, _req: &SignupRequest) -> Result<SignupResponse, ApiError> {
        self.signup_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted signup call")
    }

    async fn verify_otp(&self, _email: &str, _otp: &str) -> Result<OtpVerifyResponse, ApiError> {
        self.otp_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted verify_otp call")
    }

    async fn fetch_profile(&self, _token: &str) -> Result<UserProfile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted fetch_profile call")
    }

    async fn update_profile(
        &self,
        _token: &str,
        _patch: &ProfileUpdate,
    ) -> Result<UserProfile, ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted update_profile call")
    }

    async fn request_password_reset(&self, _email: &str) -> Result<MessageResponse, ApiError> {
        self.message_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted request_password_reset call")
    }

    async fn confirm_password_reset(
        &self,
        _req: &PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.message_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted confirm_password_reset call")
    }
}
