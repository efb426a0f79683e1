//! Authorization and forwarding for the GraphQL proxy.
//!
//! Flow Overview:
//! 1) Obtain the tenant Bearer token; without it nothing is forwarded.
//! 2) Resolve the session, if any, to its user token. A missing or expired
//!    session turns the call into a tenant-only request.
//! 3) With a user token, both tokens must carry the same `tenantId` claim.
//!    The claims are decoded WITHOUT signature verification, so this check
//!    only catches cross-tenant token mixups; it does not authenticate.
//! 4) Forward with the Bearer token pinned and `X-User-Token` when present,
//!    then normalise authentication failures from the backend.

mod envelope;

pub use envelope::{error_envelope, is_auth_failure, AUTH_FAILURE_CODES};

use crate::{
    backend::{BackendClient, BackendError, GraphQlRequest},
    session::{SessionError, SessionManager},
    tenant::{claims, TokenError, TokenManager},
};
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("graphql request has no query")]
    MissingQuery,
    #[error("tenant credentials unavailable: {0}")]
    Token(#[from] TokenError),
    #[error("tenant claim mismatch between bearer and user tokens")]
    TenantMismatch,
    #[error("backend rejected the credentials")]
    Unauthenticated,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("graphql backend unreachable: {0}")]
    Backend(#[from] BackendError),
    #[error("graphql backend returned an unusable reply ({0})")]
    BadGateway(StatusCode),
}

/// Credentials attached to a forwarded request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub bearer_token: String,
    pub user_token: Option<String>,
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeaders")
            .field("bearer_token", &"***")
            .field("user_token", &self.user_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ProxyAuthorizer {
    tokens: TokenManager,
    sessions: SessionManager,
    backend: BackendClient,
}

impl ProxyAuthorizer {
    #[must_use]
    pub fn new(tokens: TokenManager, sessions: SessionManager, backend: BackendClient) -> Self {
        Self {
            tokens,
            sessions,
            backend,
        }
    }

    /// Collect the credentials for a proxied call.
    ///
    /// # Errors
    /// Returns `ProxyError::Token` when no Bearer token is available and
    /// `ProxyError::TenantMismatch` when the tokens belong to different tenants.
    #[instrument(skip_all, fields(has_session = session_id.is_some()))]
    pub async fn authorize(&self, session_id: Option<&str>) -> Result<AuthHeaders, ProxyError> {
        let bearer_token = self.tokens.get_token().await?;

        let user_token = match session_id {
            Some(id) => self
                .sessions
                .get_session(id)
                .await?
                .map(|session| session.user_token),
            None => None,
        };

        if let Some(user_token) = &user_token {
            check_tenant_consistency(&bearer_token, user_token)?;
        } else {
            debug!("no live session, forwarding as tenant-only request");
        }

        Ok(AuthHeaders {
            bearer_token,
            user_token,
        })
    }

    /// Authorize and forward a GraphQL request, returning the backend
    /// envelope on success.
    ///
    /// # Errors
    /// Returns `ProxyError` for a missing query, failed authorization,
    /// backend authentication failures, and unusable backend replies.
    #[instrument(skip_all, fields(operation = request.operation_name.as_deref().unwrap_or("")))]
    pub async fn forward(
        &self,
        session_id: Option<&str>,
        request: &GraphQlRequest,
    ) -> Result<Value, ProxyError> {
        if request.query.trim().is_empty() {
            return Err(ProxyError::MissingQuery);
        }

        let headers = self.authorize(session_id).await?;
        let reply = self
            .backend
            .graphql(
                request,
                &headers.bearer_token,
                headers.user_token.as_deref(),
            )
            .await?;

        if is_auth_failure(reply.status, reply.body.as_ref()) {
            warn!(status = %reply.status, "graphql backend rejected credentials");
            return Err(ProxyError::Unauthenticated);
        }

        match reply.body {
            Some(body) if !reply.status.is_server_error() => Ok(body),
            _ => Err(ProxyError::BadGateway(reply.status)),
        }
    }
}

/// Both tokens must carry the same `tenantId`. A missing or undecodable claim
/// on either side is a mismatch.
///
/// # Errors
/// Returns `ProxyError::TenantMismatch` when the claims differ.
pub fn check_tenant_consistency(bearer_token: &str, user_token: &str) -> Result<(), ProxyError> {
    let bearer_tenant = claims::tenant_id(bearer_token);
    let user_tenant = claims::tenant_id(user_token);

    match (&bearer_tenant, &user_tenant) {
        (Some(bearer), Some(user)) if bearer == user => Ok(()),
        _ => {
            warn!(
                security = true,
                bearer_tenant = bearer_tenant.as_deref().unwrap_or("<missing>"),
                user_tenant = user_tenant.as_deref().unwrap_or("<missing>"),
                "tenant mismatch between bearer and user tokens, request rejected"
            );
            Err(ProxyError::TenantMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{build_http_client, endpoint_url, RequestAuthenticator},
        session::{MemoryStore, NewSession},
        tenant::{claims::tests::unsigned_jwt, DEFAULT_REFRESH_MARGIN, TOKEN_EXCHANGE_PATH},
    };
    use anyhow::Result;
    use chrono::{TimeDelta, Utc};
    use secrecy::SecretString;
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        server: MockServer,
        proxy: ProxyAuthorizer,
        sessions: SessionManager,
    }

    async fn harness(bearer_tenant: u32) -> Result<Harness> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": unsigned_jwt(&json!({"tenantId": bearer_tenant})),
                "expiresIn": 3600,
            })))
            .mount(&server)
            .await;

        let api_url = Url::parse(&server.uri())?;
        let http = build_http_client(Duration::from_secs(5))?;
        let tokens = TokenManager::new(
            http.clone(),
            endpoint_url(&api_url, TOKEN_EXCHANGE_PATH)?,
            SecretString::from("key".to_string()),
            DEFAULT_REFRESH_MARGIN,
        );
        let backend = BackendClient::new(
            http,
            api_url.clone(),
            endpoint_url(&api_url, "/graphql")?,
            RequestAuthenticator::new(tokens.clone()),
        );
        let sessions = SessionManager::new(Arc::new(MemoryStore::new()));
        let proxy = ProxyAuthorizer::new(tokens, sessions.clone(), backend);

        Ok(Harness {
            server,
            proxy,
            sessions,
        })
    }

    async fn login(sessions: &SessionManager, user_token: String) -> Result<String> {
        let session = sessions
            .create_session(NewSession {
                user_id: "1".to_string(),
                email: "a@example.com".to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                email_verified: true,
                user_token,
                user_token_expires_at: Utc::now() + TimeDelta::hours(1),
            })
            .await?;
        Ok(session.id)
    }

    fn query() -> GraphQlRequest {
        GraphQlRequest {
            query: "{ me { id } }".to_string(),
            variables: Some(json!({"first": 10})),
            operation_name: Some("Me".to_string()),
        }
    }

    #[test]
    fn consistency_requires_matching_claims() {
        let one = unsigned_jwt(&json!({"tenantId": 1}));
        let one_text = unsigned_jwt(&json!({"tenantId": "1"}));
        let two = unsigned_jwt(&json!({"tenantId": 2}));
        let none = unsigned_jwt(&json!({"sub": "x"}));

        assert!(check_tenant_consistency(&one, &one_text).is_ok());
        assert!(check_tenant_consistency(&one, &two).is_err());
        assert!(check_tenant_consistency(&one, &none).is_err());
        assert!(check_tenant_consistency(&none, &one).is_err());
        assert!(check_tenant_consistency(&one, "opaque").is_err());
    }

    #[tokio::test]
    async fn tenant_mismatch_never_reaches_backend() -> Result<()> {
        let harness = harness(1).await?;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .expect(0)
            .mount(&harness.server)
            .await;

        let id = login(&harness.sessions, unsigned_jwt(&json!({"tenantId": 2}))).await?;
        let result = harness.proxy.forward(Some(id.as_str()), &query()).await;
        assert!(matches!(result, Err(ProxyError::TenantMismatch)));
        Ok(())
    }

    #[tokio::test]
    async fn forwards_both_tokens_for_live_session() -> Result<()> {
        let harness = harness(1).await?;
        let user_token = unsigned_jwt(&json!({"tenantId": 1, "sub": "1"}));
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("x-user-token", user_token.as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"me": {"id": "1"}}})),
            )
            .expect(1)
            .mount(&harness.server)
            .await;

        let id = login(&harness.sessions, user_token.clone()).await?;
        let headers = harness.proxy.authorize(Some(id.as_str())).await?;
        assert_eq!(headers.user_token.as_deref(), Some(user_token.as_str()));

        let body = harness.proxy.forward(Some(id.as_str()), &query()).await?;
        assert_eq!(body, json!({"data": {"me": {"id": "1"}}}));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_is_tenant_only() -> Result<()> {
        let harness = harness(1).await?;
        let headers = harness.proxy.authorize(Some("missing")).await?;
        assert_eq!(headers.user_token, None);
        assert!(!headers.bearer_token.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn auth_error_codes_become_unauthenticated() -> Result<()> {
        let harness = harness(1).await?;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "expired", "extensions": {"code": "TOKEN_EXPIRED"}}]
            })))
            .mount(&harness.server)
            .await;

        let result = harness.proxy.forward(None, &query()).await;
        assert!(matches!(result, Err(ProxyError::Unauthenticated)));
        Ok(())
    }

    #[tokio::test]
    async fn non_auth_errors_pass_through() -> Result<()> {
        let harness = harness(1).await?;
        let envelope = json!({
            "data": null,
            "errors": [{"message": "bad input", "extensions": {"code": "BAD_USER_INPUT"}}]
        });
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(400).set_body_json(envelope.clone()))
            .mount(&harness.server)
            .await;

        let body = harness.proxy.forward(None, &query()).await?;
        assert_eq!(body, envelope);
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_bad_gateway() -> Result<()> {
        let harness = harness(1).await?;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({"errors": []})))
            .mount(&harness.server)
            .await;

        let result = harness.proxy.forward(None, &query()).await;
        assert!(matches!(
            result,
            Err(ProxyError::BadGateway(StatusCode::BAD_GATEWAY))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_rejected_first() -> Result<()> {
        let harness = harness(1).await?;
        let request = GraphQlRequest {
            query: "  ".to_string(),
            variables: None,
            operation_name: None,
        };
        let result = harness.proxy.forward(None, &request).await;
        assert!(matches!(result, Err(ProxyError::MissingQuery)));
        Ok(())
    }
}
