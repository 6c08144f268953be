//! Shared REST state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dinepoints_core::error::LoyaltyError;
use dinepoints_loyalty::LoyaltyEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LoyaltyEngine>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// Engine error carried to the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub LoyaltyError);

impl From<LoyaltyError> for ApiError {
    fn from(err: LoyaltyError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LoyaltyError::NotFound(_) => StatusCode::NOT_FOUND,
            LoyaltyError::Validation(_) => StatusCode::BAD_REQUEST,
            LoyaltyError::InsufficientPoints { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LoyaltyError::InvalidState(_)
            | LoyaltyError::AlreadyClaimed(_)
            | LoyaltyError::Conflict(_) => StatusCode::CONFLICT,
            LoyaltyError::Config(_) | LoyaltyError::Serialization(_) | LoyaltyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), "Request failed");
            metrics::counter!("api.errors").increment(1);
            "Internal processing error".to_string()
        } else {
            warn!(error = %self.0, kind = self.0.kind(), "Request rejected");
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready. 200 once an active program can be resolved.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.engine.program() {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LoyaltyError::not_found("account u1"), StatusCode::NOT_FOUND),
            (LoyaltyError::validation("amount"), StatusCode::BAD_REQUEST),
            (
                LoyaltyError::InsufficientPoints {
                    required: 10,
                    available: 0,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LoyaltyError::invalid_state("not completed"), StatusCode::CONFLICT),
            (LoyaltyError::AlreadyClaimed("c".into()), StatusCode::CONFLICT),
            (LoyaltyError::Conflict("v".into()), StatusCode::CONFLICT),
            (
                LoyaltyError::Internal(anyhow::anyhow!("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
