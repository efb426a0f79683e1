use super::{authenticator::RequestAuthenticator, endpoint_url};
use crate::{tenant::TokenError, APP_USER_AGENT};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{header::HeaderValue, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::Url;
use utoipa::ToSchema;

/// Header carrying the user token on calls made on behalf of a session.
pub const USER_TOKEN_HEADER: &str = "X-User-Token";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend responded with {status}")]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Build the shared HTTP client for backend calls.
///
/// # Errors
/// Returns `reqwest::Error` if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .use_rustls_tls()
        .build()
}

/// User profile as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email_verified: bool,
}

// Ids arrive as JSON numbers or strings depending on the backend.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in: Option<i64>,
    pub user: Option<BackendUser>,
}

impl LoginResponse {
    /// User-token expiry from `expiresAt`, else `expiresIn`, else the JWT
    /// `exp` claim.
    #[must_use]
    pub fn token_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| {
                self.expires_in
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            })
            .or_else(|| {
                self.token
                    .as_deref()
                    .and_then(|token| crate::tenant::claims::decode_unverified(token).ok())
                    .and_then(|claims| claims.expires_at())
            })
    }
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("success", &self.success)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<BackendUser>,
    pub message: Option<String>,
}

#[derive(ToSchema, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Raw GraphQL reply; `body` is `None` when the backend did not return JSON.
#[derive(Debug, Clone)]
pub struct GraphQlReply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    api_url: Url,
    graphql_url: Url,
    authenticator: RequestAuthenticator,
}

impl BackendClient {
    #[must_use]
    pub fn new(
        client: Client,
        api_url: Url,
        graphql_url: Url,
        authenticator: RequestAuthenticator,
    ) -> Self {
        Self {
            client,
            api_url,
            graphql_url,
            authenticator,
        }
    }

    #[must_use]
    pub fn authenticator(&self) -> &RequestAuthenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, BackendError> {
        let request = self
            .client
            .post(self.url("/auth/login")?)
            .json(&json!({ "email": email, "password": password }));

        decode(self.send(request).await?).await
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<SignupResponse, BackendError> {
        let request = self.client.post(self.url("/auth/signup")?).json(&json!({
            "email": email,
            "password": password,
            "firstName": first_name,
            "lastName": last_name,
        }));

        decode(self.send(request).await?).await
    }

    /// Revoke the user token on the backend.
    ///
    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn logout(&self, user_token: &str) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.url("/auth/logout")?)
            .header(USER_TOKEN_HEADER, user_token_header(user_token)?);

        self.send(request).await?;
        Ok(())
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn forgot_password(&self, email: &str) -> Result<(), BackendError> {
        self.post_json("/auth/forgot-password", &json!({ "email": email }))
            .await
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), BackendError> {
        self.post_json(
            "/auth/reset-password",
            &json!({ "token": token, "password": password }),
        )
        .await
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<(), BackendError> {
        self.post_json("/auth/verify-email", &json!({ "token": token }))
            .await
    }

    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn resend_verification(&self, email: &str) -> Result<(), BackendError> {
        self.post_json("/auth/resend-verification", &json!({ "email": email }))
            .await
    }

    /// Fetch the tenant record; used at startup to prove the API key works.
    ///
    /// # Errors
    /// Returns `BackendError` on transport failure or a non-2xx status.
    #[instrument(skip_all)]
    pub async fn validate_tenant(&self) -> Result<Value, BackendError> {
        let request = self.client.get(self.url("/tenant")?);
        decode(self.send(request).await?).await
    }

    /// Forward a GraphQL request with a pinned Bearer token.
    ///
    /// The status is not checked; the caller interprets the reply.
    ///
    /// # Errors
    /// Returns `BackendError` on transport failure.
    #[instrument(skip_all)]
    pub async fn graphql(
        &self,
        body: &GraphQlRequest,
        bearer_token: &str,
        user_token: Option<&str>,
    ) -> Result<GraphQlReply, BackendError> {
        let mut request = self
            .client
            .post(self.graphql_url.clone())
            .bearer_auth(bearer_token)
            .json(body);
        if let Some(user_token) = user_token {
            request = request.header(USER_TOKEN_HEADER, user_token_header(user_token)?);
        }

        let response = self.dispatch(request).await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).ok();
        if body.is_none() {
            warn!(%status, "graphql backend returned a non-JSON body");
        }

        Ok(GraphQlReply { status, body })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<(), BackendError> {
        let request = self.client.post(self.url(path)?).json(body);
        self.send(request).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        Ok(endpoint_url(&self.api_url, path)?)
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let request = self.authenticator.authorize(request.build()?).await?;
        debug!(method = %request.method(), path = %request.url().path(), "backend request");
        Ok(self.client.execute(request).await?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.dispatch(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| error_message(&body));
        error!(%status, message = message.as_deref().unwrap_or(""), "backend request rejected");

        Err(BackendError::Status { status, message })
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| BackendError::Decode(err.to_string()))
}

fn user_token_header(user_token: &str) -> Result<HeaderValue, BackendError> {
    let mut value = HeaderValue::from_str(user_token)
        .map_err(|_| BackendError::Decode("user token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

// Backends put the reason at `message` or `error.message`.
fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error").and_then(|error| error.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}
