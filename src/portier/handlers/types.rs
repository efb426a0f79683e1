//! Request/response types for the auth endpoints.

use crate::{backend::BackendUser, session::Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    pub token: String,
}

/// Public view of a user. Never carries tokens.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: bool,
}

impl From<&Session> for UserProfile {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            email: session.email.clone(),
            first_name: session.first_name.clone(),
            last_name: session.last_name.clone(),
            email_verified: session.email_verified,
        }
    }
}

impl From<BackendUser> for UserProfile {
    fn from(user: BackendUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: user.email_verified,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserProfile,
    pub session_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub success: bool,
    pub user: Option<UserProfile>,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub(super) fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub needs_refresh: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserProfile,
    pub session: SessionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn signup_request_reads_camel_case() -> Result<()> {
        let request: SignupRequest = serde_json::from_value(json!({
            "email": "a@example.com",
            "password": "password1",
            "firstName": "Ada",
            "lastName": "Lovelace"
        }))?;
        assert_eq!(request.first_name, "Ada");
        assert_eq!(request.last_name, "Lovelace");
        Ok(())
    }

    #[test]
    fn login_request_tolerates_missing_fields() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(json!({"email": "a@example.com"}))?;
        assert!(request.password.is_empty());
        Ok(())
    }

    #[test]
    fn user_profile_serializes_camel_case() -> Result<()> {
        let profile = UserProfile {
            id: "1".to_string(),
            email: "a@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email_verified: true,
        };
        let value = serde_json::to_value(&profile)?;
        assert_eq!(value.get("firstName"), Some(&json!("Ada")));
        assert_eq!(value.get("emailVerified"), Some(&json!(true)));
        Ok(())
    }
}
