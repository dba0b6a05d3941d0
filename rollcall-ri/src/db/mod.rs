//! SQLite persistence
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`) so
//! that string comparison in SQL matches chronological order. Dates are ISO
//! 8601 and structured values (contacts, merged views) are JSON text.

pub mod analytics;
pub mod crosswalk;
pub mod districts;
pub mod persons;
pub mod provider_state;
pub mod records;
pub mod reviews;
pub mod settings;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rollcall_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Open (creating if needed) the service database and its tables
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5_000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with all tables
///
/// One connection only: each `:memory:` connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    settings::create_settings_table(pool).await?;
    records::create_source_records_table(pool).await?;
    persons::create_canonical_persons_table(pool).await?;
    crosswalk::create_crosswalk_table(pool).await?;
    reviews::create_pending_reviews_table(pool).await?;
    districts::create_electoral_districts_table(pool).await?;
    provider_state::create_provider_state_table(pool).await?;
    analytics::create_lookup_analytics_table(pool).await?;
    Ok(())
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn fmt_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>> {
    raw.as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .map_err(Error::from)
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}

/// Map a unique-constraint violation to [`Error::Conflict`]
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::Conflict(what()),
        _ => Error::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_initializes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("nested").join("rollcall.db"))
            .await
            .unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for expected in [
            "canonical_persons",
            "crosswalk",
            "electoral_districts",
            "lookup_analytics",
            "pending_reviews",
            "provider_state",
            "settings",
            "source_records",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }

        // Idempotent
        init_tables(&pool).await.unwrap();
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        use chrono::SubsecRound;
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(fmt_ts(&earlier) < fmt_ts(&later));
        assert_eq!(parse_ts(&fmt_ts(&earlier)).unwrap(), earlier.trunc_subsecs(6));
    }
}
