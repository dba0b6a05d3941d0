//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while any provider is degraded
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub degraded_providers: Vec<String>,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let mut degraded_providers: Vec<String> =
        state.scheduler.degraded_providers().await.into_iter().collect();
    degraded_providers.sort();

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if degraded_providers.is_empty() { "ok" } else { "degraded" }.to_string(),
        module: "rollcall-ri".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        degraded_providers,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
