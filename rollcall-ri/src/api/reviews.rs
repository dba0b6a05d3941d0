//! Manual identity review endpoints

use crate::db::reviews;
use crate::resolver::{ResolutionOutcome, ReviewAction};
use crate::types::{PendingReview, ReviewStatus};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    /// `pending` (default), `resolved`, `dismissed` or `all`
    pub status: Option<String>,
}

/// GET /api/reviews?status=pending
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<Json<Vec<PendingReview>>> {
    let status = match query.status.as_deref().unwrap_or("pending") {
        "all" => None,
        "pending" => Some(ReviewStatus::Pending),
        "resolved" => Some(ReviewStatus::Resolved),
        "dismissed" => Some(ReviewStatus::Dismissed),
        other => return Err(ApiError::BadRequest(format!("Unknown review status: {}", other))),
    };
    Ok(Json(reviews::list_reviews(&state.db, status).await?))
}

/// POST /api/reviews/:id/resolve
///
/// **Request:** `{"action": "attach", "canonical_id": "..."}`,
/// `{"action": "create_new"}` or `{"action": "dismiss"}`
///
/// **Errors:**
/// - 404: unknown review
/// - 400: attach target is not a candidate
/// - 409: review already closed, or target already has an identity from the provider
pub async fn resolve_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> ApiResult<Json<ResolutionOutcome>> {
    let outcome = state
        .resolver
        .resolve_review(review_id, action, &state.reconciler)
        .await?;
    Ok(Json(outcome))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reviews", get(list_reviews))
        .route("/api/reviews/:id/resolve", post(resolve_review))
}
