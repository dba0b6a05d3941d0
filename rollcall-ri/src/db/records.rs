//! Append-only source record storage
//!
//! Every fetch appends a new row; rows are never updated. The latest record
//! for a provider identity is the one with the highest `seq`.

use super::{fmt_date, fmt_ts, parse_opt_date, parse_ts, parse_uuid};
use crate::types::{ContactInfo, Jurisdiction, Level, SourceRecord, TermDates};
use chrono::{DateTime, Utc};
use rollcall_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn create_source_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT NOT NULL UNIQUE,
            provider TEXT NOT NULL,
            native_id TEXT NOT NULL,
            name TEXT NOT NULL,
            office TEXT,
            level TEXT NOT NULL,
            state TEXT NOT NULL,
            district TEXT,
            party TEXT,
            contacts TEXT NOT NULL,
            term_start TEXT,
            term_end TEXT,
            in_office INTEGER,
            populated_fields INTEGER NOT NULL,
            fetched_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_records_identity
         ON source_records (provider, native_id, seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const RECORD_COLUMNS: &str = "r.record_id, r.provider, r.native_id, r.name, r.office, r.level, \
     r.state, r.district, r.party, r.contacts, r.term_start, r.term_end, r.in_office, r.fetched_at";

pub async fn insert_record(pool: &SqlitePool, record: &SourceRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO source_records (
            record_id, provider, native_id, name, office, level, state, district, party,
            contacts, term_start, term_end, in_office, populated_fields, fetched_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.record_id.to_string())
    .bind(&record.provider)
    .bind(&record.native_id)
    .bind(&record.name)
    .bind(&record.office)
    .bind(record.jurisdiction.level.as_str())
    .bind(&record.jurisdiction.state)
    .bind(&record.jurisdiction.district)
    .bind(&record.party)
    .bind(serde_json::to_string(&record.contacts)?)
    .bind(record.term.start.as_ref().map(fmt_date))
    .bind(record.term.end.as_ref().map(fmt_date))
    .bind(record.in_office)
    .bind(record.populated_fields() as i64)
    .bind(fmt_ts(&record.fetched_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_record(pool: &SqlitePool, record_id: Uuid) -> Result<Option<SourceRecord>> {
    let sql = format!("SELECT {} FROM source_records r WHERE r.record_id = ?", RECORD_COLUMNS);
    sqlx::query(&sql)
        .bind(record_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|row| record_from_row(&row))
        .transpose()
}

/// Most recent record for one provider identity
pub async fn latest_record(
    pool: &SqlitePool,
    provider: &str,
    native_id: &str,
) -> Result<Option<SourceRecord>> {
    let sql = format!(
        "SELECT {} FROM source_records r WHERE r.provider = ? AND r.native_id = ?
         ORDER BY r.seq DESC LIMIT 1",
        RECORD_COLUMNS
    );
    sqlx::query(&sql)
        .bind(provider)
        .bind(native_id)
        .fetch_optional(pool)
        .await?
        .map(|row| record_from_row(&row))
        .transpose()
}

/// Latest record of every crosswalk entry of a canonical person
pub async fn latest_records_for_person(
    pool: &SqlitePool,
    canonical_id: Uuid,
) -> Result<Vec<SourceRecord>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM crosswalk c
        JOIN source_records r ON r.provider = c.provider AND r.native_id = c.native_id
        WHERE c.canonical_id = ?
          AND r.seq = (
              SELECT MAX(r2.seq) FROM source_records r2
              WHERE r2.provider = c.provider AND r2.native_id = c.native_id
          )
        ORDER BY c.provider
        "#,
        RECORD_COLUMNS
    );
    sqlx::query(&sql)
        .bind(canonical_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(record_from_row)
        .collect()
}

/// Delete superseded records fetched before `cutoff`
///
/// The latest record of every provider identity and records held by a
/// pending review are always kept.
pub async fn purge_superseded(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM source_records
        WHERE fetched_at < ?
          AND seq NOT IN (
              SELECT MAX(seq) FROM source_records GROUP BY provider, native_id
          )
          AND record_id NOT IN (
              SELECT record_id FROM pending_reviews WHERE status = 'pending'
          )
        "#,
    )
    .bind(fmt_ts(&cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn count_records(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM source_records")
        .fetch_one(pool)
        .await?)
}

fn record_from_row(row: &SqliteRow) -> Result<SourceRecord> {
    let level: String = row.get("level");
    let level: Level = level.parse().map_err(Error::Internal)?;
    let state: String = row.get("state");
    let district: Option<String> = row.get("district");
    let contacts: String = row.get("contacts");
    let contacts: ContactInfo = serde_json::from_str(&contacts)?;
    let record_id: String = row.get("record_id");
    let fetched_at: String = row.get("fetched_at");

    Ok(SourceRecord {
        record_id: parse_uuid(&record_id)?,
        provider: row.get("provider"),
        native_id: row.get("native_id"),
        name: row.get("name"),
        office: row.get("office"),
        jurisdiction: Jurisdiction::new(level, &state, district.as_deref()),
        party: row.get("party"),
        contacts,
        term: TermDates {
            start: parse_opt_date(row.get("term_start"))?,
            end: parse_opt_date(row.get("term_end"))?,
        },
        in_office: row.get("in_office"),
        fetched_at: parse_ts(&fetched_at)?,
    })
}
