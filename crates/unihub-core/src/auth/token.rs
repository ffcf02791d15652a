//! JWT payload inspection.
//!
//! The client never verifies signatures (it has no key and validity is the
//! server's call); it only needs the expiry baked into the token. Decoding
//! is pure: no storage, no network, no clock other than the comparison in
//! `is_expired`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims carried by UniHub access and refresh tokens (simplejwt layout).
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Numeric id of the token's user.
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Decode the claims of a compact JWT. Any malformed input is `None`:
/// wrong segment count, bad base64, payload that is not a claims object.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let _signature = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The token's embedded expiry instant.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token)?;
    DateTime::from_timestamp(claims.exp, 0)
}

/// Whether the token's embedded expiry has passed. A token that cannot be
/// decoded counts as expired.
pub fn is_expired(token: &str) -> bool {
    match expires_at(token) {
        Some(expiry) => Utc::now() >= expiry,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::forge_jwt;
    use chrono::Duration;

    #[test]
    fn test_decodes_exp_and_user_id() {
        let expiry = Utc::now() + Duration::minutes(10);
        let token = forge_jwt(expiry, Some(7));

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, expiry.timestamp());
        assert_eq!(claims.user_id, Some(7));
        assert_eq!(expires_at(&token).unwrap().timestamp(), expiry.timestamp());
    }

    #[test]
    fn test_future_token_is_not_expired() {
        let token = forge_jwt(Utc::now() + Duration::minutes(10), None);
        assert!(!is_expired(&token));
    }

    #[test]
    fn test_past_token_is_expired() {
        let token = forge_jwt(Utc::now() - Duration::minutes(10), None);
        assert!(is_expired(&token));
    }

    #[test]
    fn test_malformed_tokens_decode_to_none() {
        assert!(decode_claims("").is_none());
        assert!(decode_claims("only-one-segment").is_none());
        assert!(decode_claims("a.b").is_none());
        assert!(decode_claims("a.b.c.d").is_none());
        // Not base64url
        assert!(decode_claims("head.!!!.sig").is_none());
        // Valid base64 but not a claims object
        let payload = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        assert!(decode_claims(&format!("head.{}.sig", payload)).is_none());
    }

    #[test]
    fn test_undecodable_counts_as_expired() {
        assert!(is_expired("garbage"));
    }
}
