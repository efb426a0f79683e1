//! Session lifecycle on top of a [`SessionStore`].
//!
//! Expiry is lazy: a record whose user token has expired is removed the next
//! time it is read. An optional reaper task sweeps records nobody reads again.

use super::{
    model::{NewSession, Session, SessionValidation},
    store::{SessionStore, StoreError},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/// Default window before user-token expiry in which a session is flagged.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to generate session id: {0}")]
    Entropy(String),
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    refresh_threshold: Duration,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("refresh_threshold", &self.refresh_threshold)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    /// Persist a new session under a fresh random id.
    ///
    /// # Errors
    /// Returns `SessionError` if the OS RNG fails or the store rejects the write.
    #[instrument(skip_all, fields(user_id = %new_session.user_id))]
    pub async fn create_session(&self, new_session: NewSession) -> Result<Session, SessionError> {
        let id = generate_session_id()?;
        let session = new_session.into_session(id, Utc::now());

        self.store.save(session.clone()).await?;
        info!("session created");

        Ok(session)
    }

    /// Look up a live session and mark it as accessed.
    ///
    /// An expired record is deleted and reported as absent.
    ///
    /// # Errors
    /// Returns `SessionError` if the store fails.
    #[instrument(skip_all)]
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        if id.is_empty() {
            return Ok(None);
        }

        let session = self.store.touch(id, Utc::now()).await?;
        if session.is_none() {
            debug!("session absent or expired");
        }

        Ok(session)
    }

    /// # Errors
    /// Returns `SessionError` if the store fails.
    pub async fn validate_session(&self, id: &str) -> Result<SessionValidation, SessionError> {
        let Some(session) = self.get_session(id).await? else {
            return Ok(SessionValidation::invalid());
        };

        let needs_refresh = session.expires_within(Utc::now(), self.refresh_threshold);

        Ok(SessionValidation {
            valid: true,
            session: Some(session),
            needs_refresh,
        })
    }

    /// Replace the user token of an existing session, leaving every other
    /// field untouched.
    ///
    /// # Errors
    /// Returns `SessionError` if the store fails.
    #[instrument(skip_all)]
    pub async fn refresh_user_token(
        &self,
        id: &str,
        user_token: String,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, SessionError> {
        let session = self
            .store
            .replace_user_token(id, user_token, expires_at)
            .await?;
        if session.is_some() {
            debug!(%expires_at, "user token replaced");
        }

        Ok(session)
    }

    /// # Errors
    /// Returns `SessionError` if the store fails.
    pub async fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        self.store.delete(id).await?;
        Ok(())
    }

    /// # Errors
    /// Returns `SessionError` if the store fails.
    pub async fn delete_all_sessions(&self) -> Result<(), SessionError> {
        self.store.clear().await?;
        Ok(())
    }

    /// Periodically purge expired records from the store.
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match store.purge_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "expired sessions purged"),
                    Err(err) => error!("Failed to purge expired sessions: {err}"),
                }
            }
        })
    }
}

/// 32 bytes from the OS CSPRNG, base64url without padding.
fn generate_session_id() -> Result<String, SessionError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| SessionError::Entropy(err.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
