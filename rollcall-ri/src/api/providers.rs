//! Provider health endpoint

use crate::db::provider_state;
use crate::scheduler::RateLimit;
use crate::{ApiResult, AppState};
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub reliability: f64,
    pub staleness_hours: i64,
    pub rate_limit: Option<RateLimit>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub degraded: bool,
    /// Resume cursor; `None` means the next cycle starts from the first page
    pub cursor: Option<String>,
}

/// GET /api/providers
pub async fn list_providers(State(state): State<AppState>) -> ApiResult<Json<Vec<ProviderStatus>>> {
    let health: HashMap<String, _> = state
        .scheduler
        .health_snapshot()
        .await
        .into_iter()
        .map(|h| (h.provider.clone(), h))
        .collect();
    let cursors: HashMap<String, Option<String>> = provider_state::load_all(&state.db)
        .await?
        .into_iter()
        .map(|s| (s.health.provider, s.cursor))
        .collect();

    let registry = state.pipeline.registry();
    let statuses = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let adapter = registry.get(&name)?;
            let profile = adapter.profile();
            let h = health.get(&name);
            Some(ProviderStatus {
                reliability: profile.reliability,
                staleness_hours: profile.staleness.num_hours(),
                rate_limit: state.scheduler.rate_limit(&name),
                last_success: h.and_then(|h| h.last_success),
                last_failure: h.and_then(|h| h.last_failure),
                last_error: h.and_then(|h| h.last_error.clone()),
                consecutive_failures: h.map_or(0, |h| h.consecutive_failures),
                degraded: h.is_some_and(|h| h.degraded),
                cursor: cursors.get(&name).cloned().flatten(),
                provider: name,
            })
        })
        .collect();

    Ok(Json(statuses))
}

pub fn provider_routes() -> Router<AppState> {
    Router::new().route("/api/providers", get(list_providers))
}
