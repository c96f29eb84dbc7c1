use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::authorization::AccessDenied;
use super::store::StoreError;

/// Failure kinds surfaced by the lifecycle controller and the review service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Forbidden(#[from] AccessDenied),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    /// Transient storage failure; safe for the caller to retry.
    #[error("storage unavailable: {0}")]
    Store(String),
}

impl WalkError {
    pub const fn kind(&self) -> &'static str {
        match self {
            WalkError::Validation(_) => "validation_error",
            WalkError::NotFound(_) => "not_found",
            WalkError::Forbidden(_) => "forbidden",
            WalkError::InvalidState(_) => "invalid_state",
            WalkError::Conflict(_) => "conflict",
            WalkError::Store(_) => "unavailable",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            WalkError::Validation(_) => StatusCode::BAD_REQUEST,
            WalkError::NotFound(_) => StatusCode::NOT_FOUND,
            WalkError::Forbidden(_) => StatusCode::FORBIDDEN,
            WalkError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WalkError::Conflict(_) => StatusCode::CONFLICT,
            WalkError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Generic translation; services map `Conflict`/`StatusMismatch` themselves when they can
/// say more about what collided.
impl From<StoreError> for WalkError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict => WalkError::Conflict("record already exists".to_string()),
            StoreError::NotFound => WalkError::NotFound("record"),
            StoreError::StatusMismatch { current } => {
                WalkError::InvalidState(format!("operation not valid while {current}"))
            }
            StoreError::Unavailable(reason) => WalkError::Store(reason),
        }
    }
}

impl IntoResponse for WalkError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (self.status_code(), body).into_response()
    }
}
