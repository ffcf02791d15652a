use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A UniHub user profile as served by `GET /profile`.
///
/// `id` and `email` are read-only on the server; everything else can be
/// changed through a profile update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub academic_year: Option<i32>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Preferred short form for status lines: username if set, else email.
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            &self.email
        } else {
            &self.username
        }
    }

    pub fn age(&self) -> Option<i32> {
        self.date_of_birth.map(|dob| {
            let today = Utc::now().date_naive();
            let mut age = today.year() - dob.year();
            if today.ordinal() < dob.ordinal() {
                age -= 1;
            }
            age
        })
    }
}

/// Partial profile update for `PATCH /profile`.
///
/// Only populated fields are serialized, so the server sees a true partial
/// update and leaves the rest untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<i32>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.academic_year.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_response() {
        let json = r#"{
            "id": 42,
            "email": "ada@uni.example",
            "username": "ada",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "date_of_birth": "2003-12-10",
            "academic_year": 2
        }"#;

        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, 42);
        assert_eq!(profile.full_name(), "Ada Lovelace");
        assert_eq!(profile.display_name(), "ada");
        assert_eq!(
            profile.date_of_birth,
            Some(NaiveDate::from_ymd_opt(2003, 12, 10).unwrap())
        );
    }

    #[test]
    fn test_parse_profile_with_nulls() {
        let json = r#"{
            "id": 7,
            "email": "sam@uni.example",
            "username": "",
            "first_name": "Sam",
            "last_name": "Jones",
            "date_of_birth": null,
            "academic_year": null
        }"#;

        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.display_name(), "sam@uni.example");
        assert!(profile.age().is_none());
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = ProfileUpdate {
            academic_year: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"academic_year":3}"#);
        assert!(!update.is_empty());
        assert!(ProfileUpdate::default().is_empty());
    }
}
