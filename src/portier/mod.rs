//! HTTP surface: auth gateway, GraphQL proxy, health and `OpenAPI`.
//!
//! State is built once at startup and handed to handlers as
//! `Extension<Arc<AppState>>`. A small middleware resolves the session cookie
//! into a [`SessionId`] extension before any handler runs.

pub mod error;
pub mod handlers;
mod openapi;
pub mod rate_limit;

pub use openapi::{openapi, ApiDoc};

use self::{
    handlers::{auth, graphql, health, recovery, utils::cookie_header},
    rate_limit::RateLimiter,
};
use crate::{
    backend::BackendClient,
    proxy::ProxyAuthorizer,
    session::{SessionCodec, SessionManager},
    tenant::TokenManager,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use std::{fmt, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Shared service state.
pub struct AppState {
    tokens: TokenManager,
    sessions: SessionManager,
    codec: SessionCodec,
    backend: BackendClient,
    proxy: ProxyAuthorizer,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("tokens", &self.tokens)
            .field("sessions", &self.sessions)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(
        tokens: TokenManager,
        sessions: SessionManager,
        codec: SessionCodec,
        backend: BackendClient,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let proxy = ProxyAuthorizer::new(tokens.clone(), sessions.clone(), backend.clone());
        Self {
            tokens,
            sessions,
            codec,
            backend,
            proxy,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    #[must_use]
    pub fn proxy(&self) -> &ProxyAuthorizer {
        &self.proxy
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

/// Session id carried by the request cookie, if any.
///
/// The id is not checked against the store here; handlers decide what a
/// missing or expired session means for them.
#[derive(Clone, Default)]
pub struct SessionId(Option<String>);

impl SessionId {
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = if self.0.is_some() { "***" } else { "none" };
        f.debug_tuple("SessionId").field(&present).finish()
    }
}

async fn session_context(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let id = state
        .codec()
        .parse_session_id_from_cookie(cookie_header(request.headers()));
    request.extensions_mut().insert(SessionId(id));
    next.run(request).await
}

/// Build the router with every route and layer wired to `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/auth/login", post(auth::login))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/forgot-password", post(recovery::forgot_password))
        .route("/auth/reset-password", post(recovery::reset_password))
        .route("/auth/verify-email", post(recovery::verify_email))
        .route(
            "/auth/resend-verification",
            post(recovery::resend_verification),
        )
        .route("/graphql", post(graphql::graphql))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state))
                .layer(middleware::from_fn(session_context)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
