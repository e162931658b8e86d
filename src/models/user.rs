//! User, identity, and authentication request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
    #[serde(other)]
    Unknown,
}

/// Server-side user record, persisted locally as the profile snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Identity claims decoded from the bearer token.
///
/// Never stored on its own - always recomputed from the token, so a
/// discarded token takes the identity with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject_id: String,
    pub role: Role,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body for POST /auth/login.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body for POST /auth/register.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: Role,
}

/// Payload of a successful login or register.
#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    #[serde(rename = "accessToken", alias = "token")]
    pub access_token: String,
}

/// Partial profile update for PUT /auth/profile.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}
