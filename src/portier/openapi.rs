use super::handlers::{auth, graphql, health, recovery};
use axum::Json;
use utoipa::OpenApi;

/// Every served route except `/openapi.json` itself.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::signup,
        auth::logout,
        auth::me,
        recovery::forgot_password,
        recovery::reset_password,
        recovery::verify_email,
        recovery::resend_verification,
        graphql::graphql,
    ),
    tags(
        (name = "portier", description = "Service status"),
        (name = "auth", description = "Session-based user authentication"),
        (name = "graphql", description = "Authenticated GraphQL proxy")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

// axum handler for the generated document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
