//! Electoral districts observed in reconciled persons
//!
//! A district's effective range widens to cover every term observed in it.
//! The statewide seat of a level is stored with an empty district code.

use super::{fmt_date, parse_opt_date};
use crate::types::{ElectoralDistrict, Level};
use rollcall_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub async fn create_electoral_districts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS electoral_districts (
            level TEXT NOT NULL,
            state TEXT NOT NULL,
            district TEXT NOT NULL DEFAULT '',
            effective_from TEXT,
            effective_to TEXT,
            PRIMARY KEY (level, state, district)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a district, widening its effective range to include `district`'s
///
/// A missing bound on either side is open and stays open.
pub async fn observe_district(pool: &SqlitePool, district: &ElectoralDistrict) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO electoral_districts (level, state, district, effective_from, effective_to)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (level, state, district) DO UPDATE SET
            effective_from = CASE
                WHEN electoral_districts.effective_from IS NULL OR excluded.effective_from IS NULL THEN NULL
                ELSE MIN(electoral_districts.effective_from, excluded.effective_from)
            END,
            effective_to = CASE
                WHEN electoral_districts.effective_to IS NULL OR excluded.effective_to IS NULL THEN NULL
                ELSE MAX(electoral_districts.effective_to, excluded.effective_to)
            END
        "#,
    )
    .bind(district.level.as_str())
    .bind(&district.state)
    .bind(district.district.clone().unwrap_or_default())
    .bind(district.effective_from.as_ref().map(fmt_date))
    .bind(district.effective_to.as_ref().map(fmt_date))
    .execute(pool)
    .await?;

    Ok(())
}

/// Known districts, optionally for one state, ordered by level then code
pub async fn list_districts(pool: &SqlitePool, state: Option<&str>) -> Result<Vec<ElectoralDistrict>> {
    let base = "SELECT level, state, district, effective_from, effective_to FROM electoral_districts";
    let order = " ORDER BY state,
        CASE level WHEN 'federal' THEN 0 WHEN 'state' THEN 1 ELSE 2 END,
        LENGTH(district), district";

    let rows = match state {
        Some(state) => {
            sqlx::query(&format!("{} WHERE state = ?{}", base, order))
                .bind(state.to_ascii_uppercase())
                .fetch_all(pool)
                .await?
        }
        None => sqlx::query(&format!("{}{}", base, order)).fetch_all(pool).await?,
    };
    rows.iter().map(district_from_row).collect()
}

pub async fn get_district(
    pool: &SqlitePool,
    level: Level,
    state: &str,
    district: Option<&str>,
) -> Result<Option<ElectoralDistrict>> {
    sqlx::query(
        "SELECT level, state, district, effective_from, effective_to FROM electoral_districts
         WHERE level = ? AND state = ? AND district = ?",
    )
    .bind(level.as_str())
    .bind(state)
    .bind(district.unwrap_or_default())
    .fetch_optional(pool)
    .await?
    .map(|row| district_from_row(&row))
    .transpose()
}

fn district_from_row(row: &SqliteRow) -> Result<ElectoralDistrict> {
    let level: String = row.get("level");
    let district: String = row.get("district");
    Ok(ElectoralDistrict {
        level: level.parse().map_err(Error::Internal)?,
        state: row.get("state"),
        district: if district.is_empty() { None } else { Some(district) },
        effective_from: parse_opt_date(row.get("effective_from"))?,
        effective_to: parse_opt_date(row.get("effective_to"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn district(code: Option<&str>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> ElectoralDistrict {
        ElectoralDistrict {
            level: Level::State,
            state: "OR".into(),
            district: code.map(str::to_string),
            effective_from: from,
            effective_to: to,
        }
    }

    #[tokio::test]
    async fn test_observations_widen_range() {
        let pool = init_memory_database().await.unwrap();
        observe_district(&pool, &district(Some("4"), date(2021, 1, 1), date(2023, 1, 1)))
            .await
            .unwrap();
        observe_district(&pool, &district(Some("4"), date(2019, 1, 1), date(2021, 1, 1)))
            .await
            .unwrap();

        let stored = get_district(&pool, Level::State, "OR", Some("4")).await.unwrap().unwrap();
        assert_eq!(stored.effective_from, date(2019, 1, 1));
        assert_eq!(stored.effective_to, date(2023, 1, 1));

        observe_district(&pool, &district(Some("4"), date(2023, 1, 2), None)).await.unwrap();
        let stored = get_district(&pool, Level::State, "OR", Some("4")).await.unwrap().unwrap();
        assert_eq!(stored.effective_to, None);
    }

    #[tokio::test]
    async fn test_listing_orders_codes_numerically() {
        let pool = init_memory_database().await.unwrap();
        for code in ["10", "2", "1"] {
            observe_district(&pool, &district(Some(code), None, None)).await.unwrap();
        }
        observe_district(&pool, &district(None, None, None)).await.unwrap();

        let listed = list_districts(&pool, Some("or")).await.unwrap();
        let codes: Vec<Option<&str>> = listed.iter().map(|d| d.district.as_deref()).collect();
        assert_eq!(codes, vec![None, Some("1"), Some("2"), Some("10")]);
    }
}
