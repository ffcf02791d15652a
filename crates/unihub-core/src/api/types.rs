//! Request and response bodies for the UniHub API.
//!
//! Field names match the wire exactly (the backend speaks snake_case), so no
//! rename attributes are needed. Request types carrying secrets deliberately
//! do not derive `Debug`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

#[derive(Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login payload. The embedded `user` snapshot lets a UI render
/// immediately, before the profile cache has fetched anything.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub refresh: String,
    pub access: String,
    pub user: UserProfile,
}

#[derive(Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<i32>,
}

/// Signup success: the account exists but is inactive until the emailed OTP
/// is verified.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    pub message: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct OtpVerifyRequest {
    pub otp: String,
}

/// OTP verification response. The server mints tokens here, but the client
/// discards them: verification activates the account, it does not sign in.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpVerifyResponse {
    pub message: String,
    pub refresh: String,
    pub access: String,
}

#[derive(Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct PasswordResetConfirmRequest {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response_ignores_extra_user_fields() {
        // The backend sends the full user record; we keep the subset we model.
        let json = r#"{
            "refresh": "r.r.r",
            "access": "a.a.a",
            "user": {
                "id": 9,
                "email": "kim@uni.example",
                "username": "kim",
                "first_name": "Kim",
                "last_name": "Park",
                "date_of_birth": null,
                "academic_year": 1,
                "study_program": "computer_science",
                "bio": "hi",
                "rewards": 120
            }
        }"#;

        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access, "a.a.a");
        assert_eq!(resp.user.username, "kim");
        assert_eq!(resp.user.academic_year, Some(1));
    }

    #[test]
    fn test_signup_request_omits_unset_optionals() {
        let req = SignupRequest {
            email: "new@uni.example".into(),
            username: "newbie".into(),
            password: "pw".into(),
            password2: "pw".into(),
            first_name: "New".into(),
            last_name: "Student".into(),
            date_of_birth: None,
            academic_year: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("date_of_birth"));
        assert!(!json.contains("academic_year"));
    }
}
