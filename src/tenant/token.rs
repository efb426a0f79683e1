//! Tenant Bearer token lifecycle.
//!
//! Flow Overview:
//! 1) `get_token` returns the cached token while it is valid for longer than
//!    the refresh margin.
//! 2) Otherwise callers attach to the single in-flight exchange, starting one
//!    if none exists. Every concurrent caller awaits the same shared future.
//! 3) The exchange future stores its result and clears the in-flight slot
//!    itself, so the slot is released on success and on failure.
//!
//! A failed exchange leaves the previously cached token in place; retry policy
//! belongs to the caller.

use super::claims;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use url::Url;

/// Default safety margin before expiry inside which a token is renewed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Backend path that exchanges the tenant API key for a Bearer token.
pub const TOKEN_EXCHANGE_PATH: &str = "/auth/token";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token exchange request failed: {0}")]
    Transport(String),
    #[error("token exchange rejected with status {0}")]
    Rejected(u16),
    #[error("invalid token exchange response: {0}")]
    InvalidResponse(String),
}

/// Tenant credential held in process memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    #[must_use]
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True when the token outlives `now` by more than `margin`.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        self.expires_at.signed_duration_since(now) > margin
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    #[serde(alias = "accessToken")]
    token: String,
    expires_at: Option<DateTime<Utc>>,
    expires_in: Option<i64>,
}

impl ExchangeResponse {
    /// Explicit timestamp first, then a relative lifetime, then the JWT `exp`.
    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| {
                self.expires_in
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            })
            .or_else(|| {
                claims::decode_unverified(&self.token)
                    .ok()
                    .and_then(|claims| claims.expires_at())
            })
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<BearerToken, TokenError>>>;

#[derive(Default)]
struct TokenState {
    cached: Option<BearerToken>,
    in_flight: Option<RefreshFuture>,
}

struct Inner {
    client: Client,
    exchange_url: Url,
    api_key: SecretString,
    margin: Duration,
    state: Mutex<TokenState>,
}

/// Owns the tenant Bearer token. Cloning shares the same cache.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("exchange_url", &self.inner.exchange_url.as_str())
            .field("api_key", &"***")
            .field("margin", &self.inner.margin)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    #[must_use]
    pub fn new(client: Client, exchange_url: Url, api_key: SecretString, margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                exchange_url,
                api_key,
                margin,
                state: Mutex::new(TokenState::default()),
            }),
        }
    }

    #[must_use]
    pub fn exchange_url(&self) -> &Url {
        &self.inner.exchange_url
    }

    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        self.inner.margin
    }

    /// Return a Bearer token valid for longer than the refresh margin.
    ///
    /// # Errors
    /// Returns `TokenError` when a required exchange fails.
    #[instrument(skip(self))]
    pub async fn get_token(&self) -> Result<String, TokenError> {
        let pending = {
            let mut state = self.inner.state.lock().await;
            if let Some(token) = &state.cached {
                if token.is_fresh_at(Utc::now(), self.inner.margin) {
                    return Ok(token.value.clone());
                }
                debug!(expires_at = %token.expires_at, "bearer token inside refresh margin");
            }
            self.pending_refresh(&mut state)
        };

        pending.await.map(|token| token.value)
    }

    /// Exchange the API key for a new token regardless of the cached one.
    ///
    /// Joins the in-flight exchange when one is already running.
    ///
    /// # Errors
    /// Returns `TokenError` when the exchange fails; the cached token is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<String, TokenError> {
        let pending = {
            let mut state = self.inner.state.lock().await;
            self.pending_refresh(&mut state)
        };

        pending.await.map(|token| token.value)
    }

    /// Drop the cached token. An in-flight exchange is left to finish.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.cached = None;
        debug!("bearer token cache cleared");
    }

    /// Expiry of the cached token, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.inner.state.lock().await;
        state.cached.as_ref().map(BearerToken::expires_at)
    }

    // Must be called with the state lock held.
    fn pending_refresh(&self, state: &mut TokenState) -> RefreshFuture {
        if let Some(pending) = &state.in_flight {
            debug!("joining in-flight token exchange");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let pending = async move {
            let result = inner.exchange().await;
            let mut state = inner.state.lock().await;
            if let Ok(token) = &result {
                state.cached = Some(token.clone());
            }
            state.in_flight = None;
            result
        }
        .boxed()
        .shared();

        state.in_flight = Some(pending.clone());
        pending
    }
}

impl Inner {
    #[instrument(skip(self), fields(url = %self.exchange_url))]
    async fn exchange(&self) -> Result<BearerToken, TokenError> {
        let response = self
            .client
            .post(self.exchange_url.clone())
            .json(&json!({ "apiKey": self.api_key.expose_secret() }))
            .send()
            .await
            .map_err(|err| {
                error!("Token exchange request failed: {err}");
                TokenError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Token exchange rejected: {status}");
            return Err(TokenError::Rejected(status.as_u16()));
        }

        let body: ExchangeResponse = response.json().await.map_err(|err| {
            error!("Token exchange returned an unreadable body: {err}");
            TokenError::InvalidResponse("unreadable body".to_string())
        })?;

        if body.token.trim().is_empty() {
            return Err(TokenError::InvalidResponse("empty token".to_string()));
        }

        let expires_at = body
            .expiry(Utc::now())
            .ok_or_else(|| TokenError::InvalidResponse("missing token expiry".to_string()))?;

        info!(%expires_at, "bearer token refreshed");

        Ok(BearerToken::new(body.token, expires_at))
    }
}
