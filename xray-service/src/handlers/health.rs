use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Health check endpoint for Docker/K8s liveness probes.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let provider = state.pipeline.provider();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "xray-service",
            "version": env!("CARGO_PKG_VERSION"),
            "provider": provider.name(),
            "model": provider.model(),
        })),
    )
}

/// Readiness check endpoint: the model provider must be reachable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.provider().health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}
