use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - access token missing or expired")]
    Unauthorized,

    #[error("Not signed in")]
    NotAuthenticated,

    /// Rejected input, keyed by field so forms can attach messages in place.
    /// `message` is the flattened one-line rendering for everything else.
    #[error("{message}")]
    Validation {
        fields: BTreeMap<String, Vec<String>>,
        message: String,
    },

    #[error("Session refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error keys the backend uses for messages that belong to no single field.
const BARE_KEYS: [&str; 3] = ["non_field_errors", "detail", "message"];

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            // The cap can land inside a multi-byte character; back up to
            // the nearest boundary so the slice stays valid UTF-8.
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Map a non-success response to an error, parsing the DRF error body
    /// where one is present.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 => match parse_error_fields(body) {
                Some(fields) => {
                    let message = flatten_fields(&fields);
                    ApiError::Validation { fields, message }
                }
                None => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
            },
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(detail_or(body, truncated)),
            404 => ApiError::NotFound(detail_or(body, truncated)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the error means the session itself is no longer usable.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::NotAuthenticated | ApiError::RefreshFailed { .. }
        )
    }
}

/// Pull the `detail` message out of a DRF error body, falling back to the
/// raw (truncated) text.
fn detail_or(body: &str, fallback: String) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail")?.as_str().map(str::to_string))
        .unwrap_or(fallback)
}

/// Parse a DRF validation body: an object whose values are message lists
/// (or a single message string, which some views return).
fn parse_error_fields(body: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    let mut fields = BTreeMap::new();
    for (key, val) in object {
        let messages: Vec<String> = match val {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => continue,
        };
        if !messages.is_empty() {
            fields.insert(key.clone(), messages);
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Flatten a field error map into one descriptive line. Messages under bare
/// keys stand alone; field messages are prefixed with the field name.
fn flatten_fields(fields: &BTreeMap<String, Vec<String>>) -> String {
    let mut parts = Vec::new();
    for (field, messages) in fields {
        for message in messages {
            if BARE_KEYS.contains(&field.as_str()) {
                parts.push(message.clone());
            } else {
                parts.push(format!("{}: {}", field, message));
            }
        }
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_401_maps_to_unauthorized() {
        let err = ApiError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"Token is invalid or expired","code":"token_not_valid"}"#,
        );
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(err.is_auth_error());
    }

    #[test]
    fn test_login_rejection_flattens_to_bare_message() {
        let body = r#"{"non_field_errors":["Unable to log in with provided credentials."]}"#;
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        match err {
            ApiError::Validation { message, .. } => {
                assert_eq!(message, "Unable to log in with provided credentials.");
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_signup_rejection_keeps_field_map() {
        let body = r#"{
            "email": ["user with this email already exists."],
            "password": ["This password is too short.", "This password is too common."]
        }"#;
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        match err {
            ApiError::Validation { fields, message } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields["password"].len(), 2);
                assert_eq!(
                    message,
                    "email: user with this email already exists.; \
                     password: This password is too short.; \
                     password: This password is too common."
                );
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_otp_rejection_uses_message_key() {
        let body = r#"{"message":"Invalid or expired OTP."}"#;
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.to_string(), "Invalid or expired OTP.");
    }

    #[test]
    fn test_forbidden_prefers_detail_field() {
        let body = r#"{"detail":"You do not have permission to perform this action."}"#;
        let err = ApiError::from_response(StatusCode::FORBIDDEN, body);
        match err {
            ApiError::AccessDenied(msg) => {
                assert_eq!(msg, "You do not have permission to perform this action.");
            }
            other => panic!("expected AccessDenied, got {:?}", other),
        }
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let text = err.to_string();
        assert!(text.len() < 700);
        assert!(text.contains("truncated, 2000 total bytes"));
    }

    #[test]
    fn test_truncation_lands_on_char_boundaries() {
        // 200 three-byte euro signs; the byte cap falls mid-character.
        let body = "€".repeat(200);
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let text = err.to_string();
        assert!(text.starts_with("Server error: €"));
        assert!(text.contains("truncated, 600 total bytes"));
    }
}
