//! K-anonymous lookup analytics
//!
//! Rows hold only the salted address hash and a coarse (state, district)
//! bucket. Aggregates suppress any bucket with fewer than `k` distinct
//! hashes, so no reported count can single out one household.

use super::fmt_ts;
use crate::geo::AddressFingerprint;
use chrono::{DateTime, Utc};
use rollcall_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

pub async fn create_lookup_analytics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lookup_analytics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address_hash TEXT NOT NULL,
            state TEXT NOT NULL,
            district TEXT NOT NULL DEFAULT '',
            looked_up_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lookup_analytics_bucket
         ON lookup_analytics (state, district)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One reportable bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupBucket {
    pub state: String,
    pub district: Option<String>,
    pub lookups: i64,
    pub distinct_addresses: i64,
}

pub async fn record_lookup(
    pool: &SqlitePool,
    fingerprint: &AddressFingerprint,
    state: &str,
    district: Option<&str>,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO lookup_analytics (address_hash, state, district, looked_up_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(fingerprint.as_str())
    .bind(state)
    .bind(district.unwrap_or_default())
    .bind(fmt_ts(&at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Buckets with at least `k` distinct address hashes
pub async fn k_anonymous_buckets(pool: &SqlitePool, k: u32) -> Result<Vec<LookupBucket>> {
    let rows = sqlx::query(
        r#"
        SELECT state, district, COUNT(*) AS lookups, COUNT(DISTINCT address_hash) AS distinct_addresses
        FROM lookup_analytics
        GROUP BY state, district
        HAVING COUNT(DISTINCT address_hash) >= ?
        ORDER BY state, LENGTH(district), district
        "#,
    )
    .bind(k.max(1) as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let district: String = row.get("district");
            LookupBucket {
                state: row.get("state"),
                district: if district.is_empty() { None } else { Some(district) },
                lookups: row.get("lookups"),
                distinct_addresses: row.get("distinct_addresses"),
            }
        })
        .collect())
}

pub async fn purge_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM lookup_analytics WHERE looked_up_at < ?")
        .bind(fmt_ts(&cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
