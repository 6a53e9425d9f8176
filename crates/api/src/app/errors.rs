use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use propdesk_auth::AuthError;
use propdesk_core::{DomainError, FieldError, StoreError};
use propdesk_users::OtpError;

/// Response extension marking a handler failure.
///
/// Lets the transaction layer roll back even when the failure is rendered
/// with a success status (the 204 not-found responses).
#[derive(Debug, Clone, Copy)]
pub struct HandlerFailed;

/// Error returned by handlers and middleware, rendered as
/// `{"error": <code>, "message": <text>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("data validation error")]
    Fields(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Not found, answered with 204 and an empty body.
    #[error("{0} not found")]
    NoContent(&'static str),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    LimitExceeded(String),

    /// Logged in full, answered with an opaque message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Answer not-found with 204, leaving every other error as is.
    pub fn or_no_content(self) -> Self {
        match self {
            Self::NotFound(what) => Self::NoContent(what),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Fields(_) | Self::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoContent(_) => StatusCode::NO_CONTENT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Fields(_) => "validation_error",
            Self::NotFound(_) | Self::NoContent(_) => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match &self {
            Self::NoContent(_) => status.into_response(),
            Self::Fields(fields) => (
                status,
                axum::Json(json!({
                    "error": self.code(),
                    "message": self.to_string(),
                    "fields": fields,
                })),
            )
                .into_response(),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json_error(status, self.code(), "internal server error")
            }
            _ => json_error(status, self.code(), self.to_string()),
        };
        response.extensions_mut().insert(HandlerFailed);
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::LimitExceeded(msg) => Self::LimitExceeded(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) | DomainError::InvalidState(msg) => {
                Self::Validation(msg)
            }
            DomainError::Fields(fields) => Self::Fields(fields),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::LimitExceeded(msg) => Self::LimitExceeded(msg),
            DomainError::AuthenticationFailed => Self::Unauthenticated("authentication failed".into()),
            DomainError::Store(store) => store.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Authentication(msg) => Self::Unauthenticated(msg),
            AuthError::Authorization(denied) => Self::Forbidden(denied.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Invalid => Self::Validation("invalid otp".into()),
            OtpError::Provider(msg) => Self::Internal(format!("otp provider: {msg}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::Validation(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        Self::Validation(e.body_text())
    }
}
