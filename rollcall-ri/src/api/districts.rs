//! District listing endpoint

use crate::db::districts;
use crate::types::ElectoralDistrict;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DistrictQuery {
    pub state: Option<String>,
}

/// GET /api/districts?state=XX
pub async fn list_districts(
    State(state): State<AppState>,
    Query(query): Query<DistrictQuery>,
) -> ApiResult<Json<Vec<ElectoralDistrict>>> {
    let code = match query.state.as_deref() {
        Some(raw) => Some(
            crate::geo::states::to_postal_code(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown state: {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(districts::list_districts(&state.db, code).await?))
}

pub fn district_routes() -> Router<AppState> {
    Router::new().route("/api/districts", get(list_districts))
}
