//! Password recovery and email verification.
//!
//! Endpoints keyed by email always answer the same way so they cannot be used
//! to discover which addresses have accounts.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::{instrument, warn};

use super::{
    types::{EmailRequest, MessageResponse, ResetPasswordRequest, VerifyEmailRequest},
    utils::{normalize_email, valid_email, valid_password},
};
use crate::portier::{
    error::{ApiError, ErrorResponse},
    AppState,
};

const ENUMERATION_SAFE_MESSAGE: &str =
    "If an account exists for that email, a message has been sent.";
const INVALID_TOKEN: &str = "Invalid or expired token";

fn email_from(payload: Option<Json<EmailRequest>>) -> Result<String, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let email = normalize_email(&request.email);
    if valid_email(&email) {
        Ok(email)
    } else {
        Err(ApiError::Validation("Invalid email".to_string()))
    }
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset email requested", body = MessageResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<EmailRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = email_from(payload)?;

    if let Err(err) = state.backend().forgot_password(&email).await {
        warn!("Forgot-password request failed: {err}");
    }

    Ok(Json(MessageResponse::ok(ENUMERATION_SAFE_MESSAGE)))
}

#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Verification email requested", body = MessageResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_verification(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<EmailRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = email_from(payload)?;

    if let Err(err) = state.backend().resend_verification(&email).await {
        warn!("Resend-verification request failed: {err}");
    }

    Ok(Json(MessageResponse::ok(ENUMERATION_SAFE_MESSAGE)))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("Missing token".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    state
        .backend()
        .reset_password(token, &request.password)
        .await
        .map_err(|err| ApiError::from_backend(&err, INVALID_TOKEN))?;

    Ok(Json(MessageResponse::ok("Password updated")))
}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("Missing token".to_string()));
    }

    state
        .backend()
        .verify_email(token)
        .await
        .map_err(|err| ApiError::from_backend(&err, INVALID_TOKEN))?;

    Ok(Json(MessageResponse::ok("Email verified")))
}
