//! Pluggable session storage.
//!
//! [`MemoryStore`] is the in-process backend. Other backends (Redis, SQL)
//! implement [`SessionStore`] and are handed to the manager as
//! `Arc<dyn SessionStore>`.

use super::model::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record keyed by `session.id`.
    async fn save(&self, session: Session) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Mark a live record as accessed at `now` and return it.
    ///
    /// An expired record is removed and reported as absent. A missing record
    /// is never recreated, so a concurrent `delete` always wins.
    async fn touch(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Session>, StoreError>;

    /// Swap the user token of an existing record in place. Missing records
    /// stay missing.
    async fn replace_user_token(
        &self,
        id: &str,
        user_token: String,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Remove every record whose user token expired before `now`.
    ///
    /// Backends with native TTLs can keep the default, which removes nothing.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn touch(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };

        if session.is_expired_at(now) {
            sessions.remove(id);
            return Ok(None);
        }

        session.last_accessed_at = now;
        Ok(Some(session.clone()))
    }

    async fn replace_user_token(
        &self,
        id: &str,
        user_token: String,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).map(|session| {
            session.user_token = user_token;
            session.user_token_expires_at = expires_at;
            session.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.sessions.write().await.clear();
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn session(id: &str, expires_at: DateTime<Utc>) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id: "7".to_string(),
            email: "bob@example.com".to_string(),
            first_name: "Bob".to_string(),
            last_name: "Builder".to_string(),
            email_verified: false,
            user_token: "token".to_string(),
            user_token_expires_at: expires_at,
            created_at: now,
            last_accessed_at: now,
        }
    }

    #[tokio::test]
    async fn save_get_delete() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let record = session("a", Utc::now() + TimeDelta::hours(1));

        store.save(record.clone()).await?;
        assert_eq!(store.get("a").await?, Some(record));
        assert_eq!(store.get("A").await?, None);

        store.delete("a").await?;
        assert_eq!(store.get("a").await?, None);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_existing_record() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let mut record = session("a", Utc::now() + TimeDelta::hours(1));
        store.save(record.clone()).await?;

        record.user_token = "rotated".to_string();
        store.save(record).await?;

        assert_eq!(store.len().await, 1);
        let stored = store.get("a").await?.map(|s| s.user_token);
        assert_eq!(stored.as_deref(), Some("rotated"));
        Ok(())
    }

    #[tokio::test]
    async fn touch_never_recreates_missing_records() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.save(session("live", now + TimeDelta::hours(1))).await?;
        store.save(session("dead", now - TimeDelta::seconds(1))).await?;

        let touched = store.touch("live", now + TimeDelta::seconds(1)).await?;
        assert_eq!(
            touched.map(|s| s.last_accessed_at),
            Some(now + TimeDelta::seconds(1))
        );

        assert!(store.touch("dead", now).await?.is_none());
        assert!(store.get("dead").await?.is_none());

        store.delete("live").await?;
        assert!(store.touch("live", now).await?.is_none());
        assert!(store.replace_user_token("live", "T2".to_string(), now).await?.is_none());
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn touch_keeps_replaced_token() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.save(session("a", now + TimeDelta::hours(1))).await?;

        let expires_at = now + TimeDelta::hours(2);
        store
            .replace_user_token("a", "rotated".to_string(), expires_at)
            .await?;
        let touched = store.touch("a", now).await?.map(|s| (s.user_token, s.user_token_expires_at));

        assert_eq!(touched, Some(("rotated".to_string(), expires_at)));
        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_only_expired() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.save(session("live", now + TimeDelta::hours(1))).await?;
        store.save(session("dead", now - TimeDelta::seconds(1))).await?;

        assert_eq!(store.purge_expired(now).await?, 1);
        assert!(store.get("live").await?.is_some());
        assert!(store.get("dead").await?.is_none());

        store.clear().await?;
        assert!(store.is_empty().await);
        Ok(())
    }
}
