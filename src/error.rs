use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::assignment::AssignmentStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("distributor {0} has no available capacity")]
    InsufficientCapacity(Uuid),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("no distributor available for this delivery")]
    NoCandidate,

    #[error("assignment {0} has already been rated")]
    AlreadyRated(Uuid),

    #[error("deadline exceeded before the operation started")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn distributor_not_found(id: Uuid) -> Self {
        AppError::NotFound(format!("distributor {id} not found"))
    }

    pub fn assignment_not_found(id: Uuid) -> Self {
        AppError::NotFound(format!("assignment {id} not found"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientCapacity(_)
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyRated(_) => StatusCode::CONFLICT,
            AppError::NoCandidate => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
