//! Persisted per-provider ingestion state: resume cursor and health

use super::{fmt_ts, parse_opt_ts};
use crate::scheduler::ProviderHealth;
use chrono::Utc;
use rollcall_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub async fn create_provider_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_state (
            provider TEXT PRIMARY KEY,
            cursor TEXT,
            last_success TEXT,
            last_failure TEXT,
            last_error TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            degraded INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Stored state of one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderState {
    pub health: ProviderHealth,
    pub cursor: Option<String>,
}

pub async fn save_health(pool: &SqlitePool, health: &ProviderHealth) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO provider_state (
            provider, last_success, last_failure, last_error, consecutive_failures, degraded, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (provider) DO UPDATE SET
            last_success = excluded.last_success,
            last_failure = excluded.last_failure,
            last_error = excluded.last_error,
            consecutive_failures = excluded.consecutive_failures,
            degraded = excluded.degraded,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&health.provider)
    .bind(health.last_success.as_ref().map(fmt_ts))
    .bind(health.last_failure.as_ref().map(fmt_ts))
    .bind(&health.last_error)
    .bind(health.consecutive_failures as i64)
    .bind(health.degraded)
    .bind(fmt_ts(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist the resume cursor (`None` restarts from the first page)
pub async fn save_cursor(pool: &SqlitePool, provider: &str, cursor: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO provider_state (provider, cursor, updated_at) VALUES (?, ?, ?)
        ON CONFLICT (provider) DO UPDATE SET
            cursor = excluded.cursor,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(provider)
    .bind(cursor)
    .bind(fmt_ts(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_cursor(pool: &SqlitePool, provider: &str) -> Result<Option<String>> {
    let cursor: Option<Option<String>> =
        sqlx::query_scalar("SELECT cursor FROM provider_state WHERE provider = ?")
            .bind(provider)
            .fetch_optional(pool)
            .await?;
    Ok(cursor.flatten())
}

pub async fn load_all(pool: &SqlitePool) -> Result<Vec<ProviderState>> {
    sqlx::query(
        "SELECT provider, cursor, last_success, last_failure, last_error,
                consecutive_failures, degraded
         FROM provider_state ORDER BY provider",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(state_from_row)
    .collect()
}

fn state_from_row(row: &SqliteRow) -> Result<ProviderState> {
    let failures: i64 = row.get("consecutive_failures");
    Ok(ProviderState {
        health: ProviderHealth {
            provider: row.get("provider"),
            last_success: parse_opt_ts(row.get("last_success"))?,
            last_failure: parse_opt_ts(row.get("last_failure"))?,
            last_error: row.get("last_error"),
            consecutive_failures: u32::try_from(failures).unwrap_or(u32::MAX),
            degraded: row.get("degraded"),
        },
        cursor: row.get("cursor"),
    })
}
