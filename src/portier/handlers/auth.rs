//! Login, signup, logout and session introspection.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{
    types::{
        LoginRequest, LoginResponse, MeResponse, MessageResponse, SessionInfo, SignupRequest,
        SignupResponse, UserProfile,
    },
    utils::{extract_client_ip, normalize_email, valid_email, valid_password},
};
use crate::{
    portier::{
        error::{ApiError, ErrorResponse, INVALID_CREDENTIALS},
        rate_limit::{RateLimitAction, RateLimitDecision},
        AppState, SessionId,
    },
    session::{NewSession, SessionCookie},
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created; the id is also set as an HttpOnly cookie", body = LoginResponse),
        (status = 400, description = "Malformed email or password", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || !valid_password(&request.password) {
        return Err(ApiError::Validation(INVALID_CREDENTIALS.to_string()));
    }

    let client_ip = extract_client_ip(&headers);
    let limiter = state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Login) == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::Login) == RateLimitDecision::Limited
    {
        warn!("login rate limited");
        return Err(ApiError::RateLimited);
    }

    let response = state.backend().login(&email, &request.password).await?;

    let user_token = match response.token.as_deref() {
        Some(token) if response.success && !token.is_empty() => token.to_string(),
        _ => return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string())),
    };

    let Some(user) = response.user.clone() else {
        error!("Backend login succeeded without a user profile");
        return Err(ApiError::Upstream);
    };

    let now = Utc::now();
    let user_token_expires_at = response.token_expiry(now).unwrap_or_else(|| {
        let ttl = TimeDelta::from_std(state.codec().config().max_age()).unwrap_or(TimeDelta::zero());
        now + ttl
    });

    let session = state
        .sessions()
        .create_session(NewSession {
            user_id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email_verified: user.email_verified,
            user_token,
            user_token_expires_at,
        })
        .await?;

    let cookie = set_cookie(&state, &state.codec().create_session_cookie(&session.id))
        .map_err(|err| {
            error!("Failed to build session cookie: {err}");
            ApiError::Internal
        })?;

    info!(user_id = %session.user_id, "user logged in");

    let body = LoginResponse {
        success: true,
        user: UserProfile::from(&session),
        session_id: session.id,
    };

    Ok((StatusCode::OK, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created; email verification pending", body = SignupResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Account already exists", body = ErrorResponse),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<SignupRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::Validation(
            "First and last name are required".to_string(),
        ));
    }

    let response = state
        .backend()
        .signup(&email, &request.password, first_name, last_name)
        .await?;

    if !response.success {
        return Err(ApiError::Validation("Signup rejected".to_string()));
    }

    debug!("signup accepted by backend");

    let body = SignupResponse {
        success: true,
        user: response.user.map(UserProfile::from),
        message: "Account created. Check your email to verify your address.".to_string(),
    };

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    state: Extension<Arc<AppState>>,
    session_id: Extension<SessionId>,
) -> impl IntoResponse {
    if let Some(id) = session_id.as_deref() {
        match state.sessions().get_session(id).await {
            Ok(Some(session)) => {
                // Revocation is best effort; the local session goes away regardless.
                if let Err(err) = state.backend().logout(&session.user_token).await {
                    warn!("Backend logout failed: {err}");
                }
            }
            Ok(None) => debug!("logout without a live session"),
            Err(err) => error!("Failed to load session for logout: {err}"),
        }

        if let Err(err) = state.sessions().delete_session(id).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut headers = HeaderMap::new();
    match set_cookie(&state, &state.codec().create_logout_cookie()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build logout cookie: {err}"),
    }

    (
        StatusCode::OK,
        headers,
        Json(MessageResponse::ok("Logged out")),
    )
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Session is active", body = MeResponse),
        (status = 401, description = "No active session", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn me(
    state: Extension<Arc<AppState>>,
    session_id: Extension<SessionId>,
) -> Result<Json<MeResponse>, ApiError> {
    let Some(id) = session_id.as_deref() else {
        return Err(ApiError::Unauthenticated);
    };

    let validation = state.sessions().validate_session(id).await?;
    let Some(session) = validation.session.filter(|_| validation.valid) else {
        return Err(ApiError::Unauthenticated);
    };

    Ok(Json(MeResponse {
        success: true,
        user: UserProfile::from(&session),
        session: SessionInfo {
            id: session.id.clone(),
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            expires_at: session.user_token_expires_at,
            needs_refresh: validation.needs_refresh,
        },
    }))
}

fn set_cookie(state: &AppState, cookie: &SessionCookie) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&state.codec().format_set_cookie_header(cookie))
}
