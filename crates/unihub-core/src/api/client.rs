//! HTTP client for the UniHub REST API.
//!
//! This module provides the `ApiClient` struct plus the `AuthApi` trait the
//! session and cache layers are written against, so tests can swap in a
//! scripted implementation instead of a live server.
//!
//! The API uses JWT bearer authentication; tokens are passed in per call,
//! the client itself holds no session state.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::models::{ProfileUpdate, UserProfile};

use super::error::ApiError;
use super::types::{
    LoginRequest, LoginResponse, MessageResponse, OtpVerifyRequest, OtpVerifyResponse,
    PasswordResetConfirmRequest, PasswordResetRequest, RefreshRequest, RefreshResponse,
    SignupRequest, SignupResponse,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// The API surface the session manager and profile cache depend on.
///
/// `ApiClient` is the production implementation; tests drive the higher
/// layers with a scripted stub. Futures are `Send` so callers can run
/// inside spawned tasks.
pub trait AuthApi: Send + Sync {
    fn login(
        &self,
        req: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, ApiError>> + Send;

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, ApiError>> + Send;

    fn signup(
        &self,
        req: &SignupRequest,
    ) -> impl Future<Output = Result<SignupResponse, ApiError>> + Send;

    fn verify_otp(
        &self,
        email: &str,
        otp: &str,
    ) -> impl Future<Output = Result<OtpVerifyResponse, ApiError>> + Send;

    fn fetch_profile(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserProfile, ApiError>> + Send;

    fn update_profile(
        &self,
        token: &str,
        patch: &ProfileUpdate,
    ) -> impl Future<Output = Result<UserProfile, ApiError>> + Send;

    fn request_password_reset(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<MessageResponse, ApiError>> + Send;

    fn confirm_password_reset(
        &self,
        req: &PasswordResetConfirmRequest,
    ) -> impl Future<Output = Result<MessageResponse, ApiError>> + Send;
}

/// API client for UniHub.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client against the given base URL
    /// (e.g. `http://localhost:8000/api`).
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if a response is usable, signalling rate limits for retry.
    /// Returns Ok(Some(response)) for success, Ok(None) for 429, or Err.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_response(status, &body))
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.http.get(&url);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.http.request(method.clone(), &url).json(body);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

impl AuthApi for ApiClient {
    /// Exchange email and password for a token pair and user snapshot.
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        debug!("POST login");
        self.send_json(Method::POST, "login", req, None).await
    }

    /// Exchange a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        debug!("POST token refresh");
        let body = RefreshRequest {
            refresh: refresh_token.to_string(),
        };
        self.send_json(Method::POST, "token/refresh", &body, None)
            .await
    }

    /// Register a new account; the server emails an OTP for activation.
    async fn signup(&self, req: &SignupRequest) -> Result<SignupResponse, ApiError> {
        debug!(email = %req.email, "POST signup");
        self.send_json(Method::POST, "signup", req, None).await
    }

    /// Verify the emailed OTP, activating the account.
    async fn verify_otp(&self, email: &str, otp: &str) -> Result<OtpVerifyResponse, ApiError> {
        debug!(email = %email, "POST verify-otp");
        let path = format!("verify-otp/{}", email);
        let body = OtpVerifyRequest {
            otp: otp.to_string(),
        };
        self.send_json(Method::POST, &path, &body, None).await
    }

    /// Fetch the signed-in user's profile.
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ApiError> {
        debug!("GET profile");
        self.get_json("profile", Some(token)).await
    }

    /// Partially update the signed-in user's profile.
    async fn update_profile(
        &self,
        token: &str,
        patch: &ProfileUpdate,
    ) -> Result<UserProfile, ApiError> {
        debug!("PATCH profile");
        self.send_json(Method::PATCH, "profile", patch, Some(token))
            .await
    }

    /// Ask the server to email a password reset link.
    async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, ApiError> {
        debug!("POST password-reset request");
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        self.send_json(Method::POST, "password-reset/request", &body, None)
            .await
    }

    /// Complete a password reset with the uid/token pair from the email link.
    async fn confirm_password_reset(
        &self,
        req: &PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, ApiError> {
        debug!("POST password-reset confirm");
        self.send_json(Method::POST, "password-reset/confirm", req, None)
            .await
    }
}
