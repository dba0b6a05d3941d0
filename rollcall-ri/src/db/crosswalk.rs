//! Provider identifier crosswalk
//!
//! Two uniqueness constraints carry the identity invariants:
//! - `(provider, native_id)` primary key: a native id maps to one person
//! - `UNIQUE (canonical_id, provider)`: a person has one entry per provider

use super::{fmt_ts, parse_ts, parse_uuid};
use crate::types::CrosswalkEntry;
use rollcall_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn create_crosswalk_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crosswalk (
            provider TEXT NOT NULL,
            native_id TEXT NOT NULL,
            canonical_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (provider, native_id),
            UNIQUE (canonical_id, provider)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert an entry; either uniqueness violation is [`rollcall_common::Error::Conflict`]
pub async fn insert_entry(pool: &SqlitePool, entry: &CrosswalkEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO crosswalk (provider, native_id, canonical_id, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&entry.provider)
    .bind(&entry.native_id)
    .bind(entry.canonical_id.to_string())
    .bind(fmt_ts(&entry.created_at))
    .execute(pool)
    .await
    .map_err(|e| {
        super::conflict_on_unique(e, || {
            format!(
                "Crosswalk entry {}/{} → {} violates identity uniqueness",
                entry.provider, entry.native_id, entry.canonical_id
            )
        })
    })?;

    Ok(())
}

pub async fn get_entry(
    pool: &SqlitePool,
    provider: &str,
    native_id: &str,
) -> Result<Option<CrosswalkEntry>> {
    sqlx::query(
        "SELECT provider, native_id, canonical_id, created_at FROM crosswalk
         WHERE provider = ? AND native_id = ?",
    )
    .bind(provider)
    .bind(native_id)
    .fetch_optional(pool)
    .await?
    .map(|row| entry_from_row(&row))
    .transpose()
}

pub async fn entries_for_person(pool: &SqlitePool, canonical_id: Uuid) -> Result<Vec<CrosswalkEntry>> {
    sqlx::query(
        "SELECT provider, native_id, canonical_id, created_at FROM crosswalk
         WHERE canonical_id = ? ORDER BY provider",
    )
    .bind(canonical_id.to_string())
    .fetch_all(pool)
    .await?
    .iter()
    .map(entry_from_row)
    .collect()
}

/// Whether a person already has an entry from `provider`
pub async fn has_provider_entry(pool: &SqlitePool, canonical_id: Uuid, provider: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crosswalk WHERE canonical_id = ? AND provider = ?",
    )
    .bind(canonical_id.to_string())
    .bind(provider)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Persons with at least one entry from any of `providers`
pub async fn person_ids_for_providers(pool: &SqlitePool, providers: &[String]) -> Result<Vec<Uuid>> {
    if providers.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; providers.len()].join(", ");
    let sql = format!(
        "SELECT DISTINCT canonical_id FROM crosswalk WHERE provider IN ({}) ORDER BY canonical_id",
        placeholders
    );
    let mut query = sqlx::query_scalar::<_, String>(&sql);
    for provider in providers {
        query = query.bind(provider);
    }
    query
        .fetch_all(pool)
        .await?
        .iter()
        .map(|id| parse_uuid(id))
        .collect()
}

fn entry_from_row(row: &SqliteRow) -> Result<CrosswalkEntry> {
    let canonical_id: String = row.get("canonical_id");
    let created_at: String = row.get("created_at");
    Ok(CrosswalkEntry {
        provider: row.get("provider"),
        native_id: row.get("native_id"),
        canonical_id: parse_uuid(&canonical_id)?,
        created_at: parse_ts(&created_at)?,
    })
}
