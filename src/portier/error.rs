//! HTTP error envelope for the auth endpoints.
//!
//! Component errors are translated here and nowhere else. Client messages are
//! short and never echo tokens or backend text.

use crate::{backend::BackendError, session::SessionError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Conflict(String),
    #[error("Too many attempts, try again later")]
    RateLimited,
    #[error("Authentication service unavailable")]
    Upstream,
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials(_) | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Map a backend failure, using `rejected` as the message for 401/403.
    #[must_use]
    pub fn from_backend(err: &BackendError, rejected: &str) -> Self {
        match err {
            BackendError::Status { status, .. } => match status.as_u16() {
                400 | 422 => Self::Validation("Invalid request".to_string()),
                401 | 403 => Self::InvalidCredentials(rejected.to_string()),
                409 => Self::Conflict("An account with this email already exists".to_string()),
                429 => Self::RateLimited,
                _ => Self::Upstream,
            },
            BackendError::Transport(_)
            | BackendError::Decode(_)
            | BackendError::Token(_)
            | BackendError::Url(_) => {
                error!("Backend call failed: {err}");
                Self::Upstream
            }
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        Self::from_backend(&err, INVALID_CREDENTIALS)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        error!("Session store failure: {err}");
        Self::Internal
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
