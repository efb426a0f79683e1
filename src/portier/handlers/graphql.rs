use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::{
    backend::GraphQlRequest,
    portier::{AppState, SessionId},
    proxy::{error_envelope, ProxyError},
};

/// Status, GraphQL error code and client message for a proxy failure.
fn failure(err: &ProxyError) -> (StatusCode, &'static str, &'static str) {
    match err {
        ProxyError::MissingQuery => (StatusCode::BAD_REQUEST, "BAD_REQUEST", "Query is required"),
        ProxyError::Token(_) | ProxyError::TenantMismatch | ProxyError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Authentication required",
        ),
        ProxyError::Session(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Internal server error",
        ),
        ProxyError::Backend(_) | ProxyError::BadGateway(_) => (
            StatusCode::BAD_GATEWAY,
            "BAD_GATEWAY",
            "GraphQL backend unavailable",
        ),
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code, message) = failure(&self);
        if status.is_server_error() {
            error!("GraphQL proxy failure: {self}");
        }
        (status, Json(error_envelope(message, code))).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/graphql",
    request_body = GraphQlRequest,
    responses(
        (status = 200, description = "Backend GraphQL envelope, passed through"),
        (status = 400, description = "Missing query"),
        (status = 401, description = "Tenant or user credentials rejected"),
        (status = 502, description = "GraphQL backend unavailable")
    ),
    tag = "graphql"
)]
pub async fn graphql(
    state: Extension<Arc<AppState>>,
    session_id: Extension<SessionId>,
    payload: Option<Json<GraphQlRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ProxyError::MissingQuery.into_response();
    };

    match state.proxy().forward(session_id.as_deref(), &request).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TokenError;

    #[test]
    fn failures_map_to_envelope_codes() {
        let cases = [
            (ProxyError::MissingQuery, 400, "BAD_REQUEST"),
            (ProxyError::Token(TokenError::Rejected(401)), 401, "UNAUTHENTICATED"),
            (ProxyError::TenantMismatch, 401, "UNAUTHENTICATED"),
            (ProxyError::Unauthenticated, 401, "UNAUTHENTICATED"),
            (ProxyError::BadGateway(StatusCode::SERVICE_UNAVAILABLE), 502, "BAD_GATEWAY"),
        ];
        for (err, status, code) in cases {
            let (actual_status, actual_code, _) = failure(&err);
            assert_eq!(actual_status.as_u16(), status, "{err}");
            assert_eq!(actual_code, code);
        }
    }
}
