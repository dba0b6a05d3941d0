//! K-anonymous lookup analytics endpoint

use crate::db::analytics::{self, LookupBucket};
use crate::{ApiResult, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub k: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub enabled: bool,
    /// Threshold actually applied (never below the configured one)
    pub k: u32,
    pub buckets: Vec<LookupBucket>,
}

/// GET /api/analytics/lookups?k=N
pub async fn lookup_buckets(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let k = query.k.unwrap_or(state.k_anonymity).max(state.k_anonymity);
    let buckets = if state.analytics_enabled {
        analytics::k_anonymous_buckets(&state.db, k).await?
    } else {
        Vec::new()
    };

    Ok(Json(AnalyticsResponse {
        enabled: state.analytics_enabled,
        k,
        buckets,
    }))
}

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/api/analytics/lookups", get(lookup_buckets))
}
