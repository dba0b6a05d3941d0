//! Canonical person storage
//!
//! The merged view is stored as JSON; jurisdiction, name and status are
//! duplicated into columns for querying. Only the reconciler writes here.
//! Updates are optimistic: they apply only when the stored `version` still
//! equals the version the writer read.

use super::{fmt_date, fmt_ts, parse_ts, parse_uuid};
use crate::resolver::normalize::normalize_name;
use crate::types::{CanonicalPerson, Jurisdiction, Level, MergedView, PersonStatus, RecordRef};
use rollcall_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn create_canonical_persons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS canonical_persons (
            canonical_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            level TEXT NOT NULL,
            state TEXT NOT NULL,
            district TEXT,
            term_start TEXT,
            term_end TEXT,
            view TEXT NOT NULL,
            quality_score INTEGER NOT NULL,
            contributing TEXT NOT NULL,
            status TEXT NOT NULL,
            stale INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL,
            record_set_fingerprint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_reconciled_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_canonical_persons_jurisdiction
         ON canonical_persons (state, level, district)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_canonical_persons_match
         ON canonical_persons (normalized_name, state, level)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const PERSON_COLUMNS: &str = "p.canonical_id, p.view, p.quality_score, p.contributing, p.status, \
     p.stale, p.version, p.record_set_fingerprint, p.created_at, p.last_reconciled_at";

/// Insert a new person; fails with [`Error::Conflict`] if the id exists
pub async fn insert_person(pool: &SqlitePool, person: &CanonicalPerson) -> Result<()> {
    let view = &person.view;
    let term = view.term.as_ref().map(|t| t.value).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO canonical_persons (
            canonical_id, name, normalized_name, level, state, district, term_start, term_end,
            view, quality_score, contributing, status, stale, version, record_set_fingerprint,
            created_at, last_reconciled_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(person.canonical_id.to_string())
    .bind(&view.name.value)
    .bind(normalize_name(&view.name.value))
    .bind(view.jurisdiction.value.level.as_str())
    .bind(&view.jurisdiction.value.state)
    .bind(&view.jurisdiction.value.district)
    .bind(term.start.as_ref().map(fmt_date))
    .bind(term.end.as_ref().map(fmt_date))
    .bind(serde_json::to_string(view)?)
    .bind(person.quality_score as i64)
    .bind(serde_json::to_string(&person.contributing)?)
    .bind(person.status.as_str())
    .bind(person.stale)
    .bind(person.version)
    .bind(&person.record_set_fingerprint)
    .bind(fmt_ts(&person.created_at))
    .bind(fmt_ts(&person.last_reconciled_at))
    .execute(pool)
    .await
    .map_err(|e| super::conflict_on_unique(e, || format!("Person {} already exists", person.canonical_id)))?;

    Ok(())
}

/// Write `person` if the stored version is still `expected_version`
///
/// Returns `false` when another writer got there first; the caller should
/// reload and retry.
pub async fn update_person(
    pool: &SqlitePool,
    person: &CanonicalPerson,
    expected_version: i64,
) -> Result<bool> {
    let view = &person.view;
    let term = view.term.as_ref().map(|t| t.value).unwrap_or_default();

    let result = sqlx::query(
        r#"
        UPDATE canonical_persons SET
            name = ?, normalized_name = ?, level = ?, state = ?, district = ?,
            term_start = ?, term_end = ?, view = ?, quality_score = ?, contributing = ?,
            status = ?, stale = ?, version = ?, record_set_fingerprint = ?,
            last_reconciled_at = ?
        WHERE canonical_id = ? AND version = ?
        "#,
    )
    .bind(&view.name.value)
    .bind(normalize_name(&view.name.value))
    .bind(view.jurisdiction.value.level.as_str())
    .bind(&view.jurisdiction.value.state)
    .bind(&view.jurisdiction.value.district)
    .bind(term.start.as_ref().map(fmt_date))
    .bind(term.end.as_ref().map(fmt_date))
    .bind(serde_json::to_string(view)?)
    .bind(person.quality_score as i64)
    .bind(serde_json::to_string(&person.contributing)?)
    .bind(person.status.as_str())
    .bind(person.stale)
    .bind(person.version)
    .bind(&person.record_set_fingerprint)
    .bind(fmt_ts(&person.last_reconciled_at))
    .bind(person.canonical_id.to_string())
    .bind(expected_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_person(pool: &SqlitePool, canonical_id: Uuid) -> Result<Option<CanonicalPerson>> {
    let sql = format!("SELECT {} FROM canonical_persons p WHERE p.canonical_id = ?", PERSON_COLUMNS);
    sqlx::query(&sql)
        .bind(canonical_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|row| person_from_row(&row))
        .transpose()
}

/// Person a provider identity is crosswalked to
pub async fn find_by_crosswalk(
    pool: &SqlitePool,
    provider: &str,
    native_id: &str,
) -> Result<Option<CanonicalPerson>> {
    let sql = format!(
        "SELECT {} FROM canonical_persons p
         JOIN crosswalk c ON c.canonical_id = p.canonical_id
         WHERE c.provider = ? AND c.native_id = ?",
        PERSON_COLUMNS
    );
    sqlx::query(&sql)
        .bind(provider)
        .bind(native_id)
        .fetch_optional(pool)
        .await?
        .map(|row| person_from_row(&row))
        .transpose()
}

/// Jurisdiction filter for canonical reads
#[derive(Debug, Clone, Default)]
pub struct JurisdictionFilter {
    pub level: Option<Level>,
    pub state: Option<String>,
    /// `Some` restricts to one district (normalized)
    pub district: Option<String>,
    pub include_inactive: bool,
}

/// Persons matching a jurisdiction filter, ordered by level then name
pub async fn find_by_jurisdiction(
    pool: &SqlitePool,
    filter: &JurisdictionFilter,
) -> Result<Vec<CanonicalPerson>> {
    let mut sql = format!("SELECT {} FROM canonical_persons p WHERE 1 = 1", PERSON_COLUMNS);
    if filter.level.is_some() {
        sql.push_str(" AND p.level = ?");
    }
    if filter.state.is_some() {
        sql.push_str(" AND p.state = ?");
    }
    if filter.district.is_some() {
        sql.push_str(" AND p.district = ?");
    }
    if !filter.include_inactive {
        sql.push_str(" AND p.status = 'active'");
    }
    sql.push_str(
        " ORDER BY CASE p.level WHEN 'federal' THEN 0 WHEN 'state' THEN 1 ELSE 2 END,
          p.normalized_name, p.canonical_id",
    );

    let mut query = sqlx::query(&sql);
    if let Some(level) = filter.level {
        query = query.bind(level.as_str());
    }
    if let Some(state) = &filter.state {
        query = query.bind(state.to_ascii_uppercase());
    }
    if let Some(district) = &filter.district {
        query = query.bind(district);
    }

    query
        .fetch_all(pool)
        .await?
        .iter()
        .map(person_from_row)
        .collect()
}

/// Identity-match candidates: same normalized name and jurisdiction
///
/// Term overlap is checked by the caller on the merged term.
pub async fn find_by_name_and_jurisdiction(
    pool: &SqlitePool,
    normalized_name: &str,
    jurisdiction: &Jurisdiction,
) -> Result<Vec<CanonicalPerson>> {
    let sql = format!(
        "SELECT {} FROM canonical_persons p
         WHERE p.normalized_name = ? AND p.level = ? AND p.state = ?
           AND COALESCE(p.district, '') = ?
         ORDER BY p.created_at, p.canonical_id",
        PERSON_COLUMNS
    );
    sqlx::query(&sql)
        .bind(normalized_name)
        .bind(jurisdiction.level.as_str())
        .bind(&jurisdiction.state)
        .bind(jurisdiction.district.clone().unwrap_or_default())
        .fetch_all(pool)
        .await?
        .iter()
        .map(person_from_row)
        .collect()
}

pub async fn count_persons(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM canonical_persons")
        .fetch_one(pool)
        .await?)
}

fn person_from_row(row: &SqliteRow) -> Result<CanonicalPerson> {
    let canonical_id: String = row.get("canonical_id");
    let view: String = row.get("view");
    let view: MergedView = serde_json::from_str(&view)?;
    let contributing: String = row.get("contributing");
    let contributing: Vec<RecordRef> = serde_json::from_str(&contributing)?;
    let status: String = row.get("status");
    let quality_score: i64 = row.get("quality_score");
    let created_at: String = row.get("created_at");
    let last_reconciled_at: String = row.get("last_reconciled_at");

    Ok(CanonicalPerson {
        canonical_id: parse_uuid(&canonical_id)?,
        view,
        quality_score: u8::try_from(quality_score)
            .map_err(|_| Error::Internal(format!("Quality score out of range: {}", quality_score)))?,
        contributing,
        status: PersonStatus::parse(&status),
        stale: row.get("stale"),
        version: row.get("version"),
        record_set_fingerprint: row.get("record_set_fingerprint"),
        created_at: parse_ts(&created_at)?,
        last_reconciled_at: parse_ts(&last_reconciled_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::types::{Attributed, TermDates};
    use chrono::Utc;

    fn person(name: &str, level: Level, state: &str, district: Option<&str>) -> CanonicalPerson {
        let now = Utc::now();
        let record_id = Uuid::new_v4();
        let attributed = |value| Attributed {
            value,
            source: "alpha".to_string(),
            fetched_at: now,
            record_id,
        };
        CanonicalPerson {
            canonical_id: Uuid::new_v4(),
            view: MergedView {
                name: attributed(name.to_string()),
                office: None,
                jurisdiction: Attributed {
                    value: Jurisdiction::new(level, state, district),
                    source: "alpha".into(),
                    fetched_at: now,
                    record_id,
                },
                party: None,
                term: Some(Attributed {
                    value: TermDates::default(),
                    source: "alpha".into(),
                    fetched_at: now,
                    record_id,
                }),
                contacts: Vec::new(),
            },
            quality_score: 40,
            contributing: Vec::new(),
            status: PersonStatus::Active,
            stale: false,
            version: 1,
            record_set_fingerprint: "fp".into(),
            created_at: now,
            last_reconciled_at: now,
        }
    }

    #[tokio::test]
    async fn test_optimistic_update_rejects_stale_version() {
        let pool = init_memory_database().await.unwrap();
        let mut stored = person("Ada Lovelace", Level::State, "NY", Some("3"));
        insert_person(&pool, &stored).await.unwrap();

        stored.quality_score = 55;
        stored.version = 2;
        assert!(update_person(&pool, &stored, 1).await.unwrap());

        // A writer still holding version 1 loses
        stored.quality_score = 10;
        stored.version = 2;
        assert!(!update_person(&pool, &stored, 1).await.unwrap());

        let reloaded = get_person(&pool, stored.canonical_id).await.unwrap().unwrap();
        assert_eq!(reloaded.quality_score, 55);
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let pool = init_memory_database().await.unwrap();
        let stored = person("Ada Lovelace", Level::State, "NY", Some("3"));
        insert_person(&pool, &stored).await.unwrap();
        assert!(matches!(insert_person(&pool, &stored).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_jurisdiction_queries() {
        let pool = init_memory_database().await.unwrap();
        let senator = person("Zed Senator", Level::Federal, "NY", None);
        let rep = person("Amy Rep", Level::Federal, "NY", Some("3"));
        let mut retired = person("Old Timer", Level::State, "NY", Some("3"));
        retired.status = PersonStatus::Inactive;
        let other_state = person("Amy Rep", Level::Federal, "NJ", Some("3"));
        for p in [&senator, &rep, &retired, &other_state] {
            insert_person(&pool, p).await.unwrap();
        }

        let ny = find_by_jurisdiction(
            &pool,
            &JurisdictionFilter { state: Some("ny".into()), ..Default::default() },
        )
        .await
        .unwrap();
        let names: Vec<&str> = ny.iter().map(|p| p.view.name.value.as_str()).collect();
        assert_eq!(names, vec!["Amy Rep", "Zed Senator"]);

        let with_inactive = find_by_jurisdiction(
            &pool,
            &JurisdictionFilter {
                state: Some("NY".into()),
                district: Some("3".into()),
                include_inactive: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(with_inactive.len(), 2);

        let candidates = find_by_name_and_jurisdiction(
            &pool,
            "amy rep",
            &Jurisdiction::new(Level::Federal, "NY", Some("03")),
        )
        .await
        .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].canonical_id, rep.canonical_id);
    }
}
