//! Ingestion trigger endpoint

use crate::ingest::CycleReport;
use crate::{ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};

/// POST /api/ingest/run
///
/// Runs one cycle and returns its report. 409 while another cycle runs.
pub async fn run_ingest(State(state): State<AppState>) -> ApiResult<Json<CycleReport>> {
    match state.pipeline.run_cycle().await {
        Ok(report) => Ok(Json(report)),
        Err(rollcall_common::Error::Conflict(msg)) => Err(crate::ApiError::Conflict(msg)),
        Err(e) => {
            state.set_last_error(format!("Ingestion cycle failed: {}", e)).await;
            Err(e.into())
        }
    }
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/api/ingest/run", post(run_ingest))
}
