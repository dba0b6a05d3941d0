//! Address lookup endpoint
//!
//! POST keeps the address in the body, out of URLs and access logs.

use crate::lookup::{LookupRequest, LookupResponse};
use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};

/// Largest `limit` a caller may ask for
const MAX_LIMIT: usize = 200;

/// POST /api/lookup
///
/// **Request:** `{"address": "...", "limit": 10}`
/// **Response:** `{"precision": "district", "state": "IL", "representatives": [...]}`
///
/// **Errors:**
/// - 400 Bad Request: empty address or zero limit
/// - 422 Unprocessable Entity: no geocoder, cache or address-text fallback resolved it
pub async fn lookup_address(
    State(state): State<AppState>,
    Json(mut request): Json<LookupRequest>,
) -> ApiResult<Json<LookupResponse>> {
    if request.limit == Some(0) {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }
    request.limit = request.limit.map(|l| l.min(MAX_LIMIT));

    let response = state.lookup.lookup(request).await?;
    Ok(Json(response))
}

pub fn lookup_routes() -> Router<AppState> {
    Router::new().route("/api/lookup", post(lookup_address))
}
