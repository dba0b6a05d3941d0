//! Pending identity reviews
//!
//! At most one pending review exists per provider identity; a re-fetch of a
//! held identity refreshes the held record and candidate list in place.

use super::{fmt_ts, parse_opt_ts, parse_ts, parse_uuid};
use crate::types::{PendingReview, ReviewStatus};
use chrono::{DateTime, Utc};
use rollcall_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn create_pending_reviews_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_reviews (
            review_id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            native_id TEXT NOT NULL,
            record_id TEXT NOT NULL,
            candidates TEXT NOT NULL,
            status TEXT NOT NULL,
            resolution TEXT,
            created_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_reviews_open_identity
         ON pending_reviews (provider, native_id) WHERE status = 'pending'",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const REVIEW_COLUMNS: &str = "review_id, provider, native_id, record_id, candidates, status, \
     resolution, created_at, resolved_at";

pub async fn insert_review(pool: &SqlitePool, review: &PendingReview) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pending_reviews (
            review_id, provider, native_id, record_id, candidates, status, resolution,
            created_at, resolved_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(review.review_id.to_string())
    .bind(&review.provider)
    .bind(&review.native_id)
    .bind(review.record_id.to_string())
    .bind(serde_json::to_string(&review.candidates)?)
    .bind(review.status.as_str())
    .bind(review.resolution.map(|id| id.to_string()))
    .bind(fmt_ts(&review.created_at))
    .bind(review.resolved_at.as_ref().map(fmt_ts))
    .execute(pool)
    .await
    .map_err(|e| {
        super::conflict_on_unique(e, || {
            format!("Review already pending for {}/{}", review.provider, review.native_id)
        })
    })?;

    Ok(())
}

pub async fn get_review(pool: &SqlitePool, review_id: Uuid) -> Result<Option<PendingReview>> {
    let sql = format!("SELECT {} FROM pending_reviews WHERE review_id = ?", REVIEW_COLUMNS);
    sqlx::query(&sql)
        .bind(review_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|row| review_from_row(&row))
        .transpose()
}

/// Open review for a provider identity, if any
pub async fn pending_for_identity(
    pool: &SqlitePool,
    provider: &str,
    native_id: &str,
) -> Result<Option<PendingReview>> {
    let sql = format!(
        "SELECT {} FROM pending_reviews
         WHERE provider = ? AND native_id = ? AND status = 'pending'",
        REVIEW_COLUMNS
    );
    sqlx::query(&sql)
        .bind(provider)
        .bind(native_id)
        .fetch_optional(pool)
        .await?
        .map(|row| review_from_row(&row))
        .transpose()
}

/// Reviews, oldest first; `None` lists every status
pub async fn list_reviews(
    pool: &SqlitePool,
    status: Option<ReviewStatus>,
) -> Result<Vec<PendingReview>> {
    let rows = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {} FROM pending_reviews WHERE status = ? ORDER BY created_at, review_id",
                REVIEW_COLUMNS
            );
            sqlx::query(&sql).bind(status.as_str()).fetch_all(pool).await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM pending_reviews ORDER BY created_at, review_id",
                REVIEW_COLUMNS
            );
            sqlx::query(&sql).fetch_all(pool).await?
        }
    };
    rows.iter().map(review_from_row).collect()
}

/// Replace the held record and candidates of an open review
pub async fn refresh_pending(
    pool: &SqlitePool,
    review_id: Uuid,
    record_id: Uuid,
    candidates: &[Uuid],
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE pending_reviews SET record_id = ?, candidates = ?
         WHERE review_id = ? AND status = 'pending'",
    )
    .bind(record_id.to_string())
    .bind(serde_json::to_string(candidates)?)
    .bind(review_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Close an open review; `false` if it was not pending
pub async fn close_review(
    pool: &SqlitePool,
    review_id: Uuid,
    status: ReviewStatus,
    resolution: Option<Uuid>,
    resolved_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE pending_reviews SET status = ?, resolution = ?, resolved_at = ?
         WHERE review_id = ? AND status = 'pending'",
    )
    .bind(status.as_str())
    .bind(resolution.map(|id| id.to_string()))
    .bind(fmt_ts(&resolved_at))
    .bind(review_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_pending(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM pending_reviews WHERE status = 'pending'")
        .fetch_one(pool)
        .await?)
}

fn review_from_row(row: &SqliteRow) -> Result<PendingReview> {
    let review_id: String = row.get("review_id");
    let record_id: String = row.get("record_id");
    let candidates: String = row.get("candidates");
    let status: String = row.get("status");
    let resolution: Option<String> = row.get("resolution");
    let created_at: String = row.get("created_at");

    Ok(PendingReview {
        review_id: parse_uuid(&review_id)?,
        provider: row.get("provider"),
        native_id: row.get("native_id"),
        record_id: parse_uuid(&record_id)?,
        candidates: serde_json::from_str(&candidates)?,
        status: ReviewStatus::parse(&status),
        resolution: resolution.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&created_at)?,
        resolved_at: parse_opt_ts(row.get("resolved_at"))?,
    })
}
