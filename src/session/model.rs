use chrono::{DateTime, TimeDelta, Utc};
use std::{fmt, time::Duration};

/// Server-side record binding an opaque session id to a user token.
///
/// The tenant Bearer token is never stored here; it belongs to the process,
/// not to any user.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: bool,
    pub user_token: String,
    pub user_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// A session expires together with its user token.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.user_token_expires_at
    }

    /// True when the user token expires within `threshold` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
        self.user_token_expires_at.signed_duration_since(now) <= threshold
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &"***")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("user_token", &"***")
            .field("user_token_expires_at", &self.user_token_expires_at)
            .field("created_at", &self.created_at)
            .field("last_accessed_at", &self.last_accessed_at)
            .finish_non_exhaustive()
    }
}

/// Input for [`super::SessionManager::create_session`].
#[derive(Clone)]
pub struct NewSession {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: bool,
    pub user_token: String,
    pub user_token_expires_at: DateTime<Utc>,
}

impl NewSession {
    pub(super) fn into_session(self, id: String, now: DateTime<Utc>) -> Session {
        Session {
            id,
            user_id: self.user_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            email_verified: self.email_verified,
            user_token: self.user_token,
            user_token_expires_at: self.user_token_expires_at,
            created_at: now,
            last_accessed_at: now,
        }
    }
}

impl fmt::Debug for NewSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSession")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("user_token", &"***")
            .field("user_token_expires_at", &self.user_token_expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionValidation {
    pub valid: bool,
    pub session: Option<Session>,
    pub needs_refresh: bool,
}

impl SessionValidation {
    pub(super) fn invalid() -> Self {
        Self {
            valid: false,
            session: None,
            needs_refresh: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: DateTime<Utc>) -> Session {
        NewSession {
            user_id: "1".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            email_verified: true,
            user_token: "user-token".to_string(),
            user_token_expires_at: expires_at,
        }
        .into_session("id".to_string(), Utc::now())
    }

    #[test]
    fn expiry_is_strictly_after_token_expiry() {
        let now = Utc::now();
        let session = session(now);
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn expires_within_threshold() {
        let now = Utc::now();
        let session = session(now + TimeDelta::minutes(4));
        assert!(session.expires_within(now, Duration::from_secs(300)));
        assert!(!session.expires_within(now, Duration::from_secs(60)));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let session = session(Utc::now());
        let output = format!("{session:?}");
        assert!(!output.contains("user-token"));
        assert!(output.contains("alice@example.com"));
    }
}
