use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub mpesa_environment: String,
    pub storage: String,
    pub storage_reachable: bool,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let storage_reachable = match state.services.payments.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Storage unreachable during health check: {}", e);
            false
        }
    };

    let (code, status) = if storage_reachable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version,
            environment: state.info.environment.clone(),
            mpesa_environment: state.info.mpesa_environment.clone(),
            storage: state.info.storage.to_string(),
            storage_reachable,
        }),
    )
}
