//! Health check endpoint for monitoring and readiness checks

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::routes::ApiState;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status (always "ok" when responding)
    pub status: String,
    /// Active signing strategy
    pub signer: String,
    pub version: String,
}

/// Returns 200 OK once the CA material is loaded and the API is serving.
pub async fn health_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            signer: state.service.strategy().to_string(),
            version: crate::VERSION.to_string(),
        }),
    )
}
