//! Settings database operations
//!
//! Runtime key-value settings: the address hashing salt and provider API
//! keys entered at runtime.

use crate::geo::privacy::generate_salt;
use rollcall_common::{Error, Result};
use sqlx::SqlitePool;

const SALT_KEY: &str = "address_hash_salt";

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn api_key_setting(provider: &str) -> String {
    format!("provider_api_key.{}", provider)
}

pub async fn get_provider_api_key(pool: &SqlitePool, provider: &str) -> Result<Option<String>> {
    get_setting::<String>(pool, &api_key_setting(provider))
        .await
        .map(|key| key.filter(|k| !k.trim().is_empty()))
}

pub async fn set_provider_api_key(pool: &SqlitePool, provider: &str, key: &str) -> Result<()> {
    set_setting(pool, &api_key_setting(provider), key).await
}

/// Stored hashing salt, generating and persisting one on first use
///
/// A salt that changes would break analytics continuity, so it is created
/// exactly once per database.
pub async fn get_or_init_salt(pool: &SqlitePool) -> Result<String> {
    if let Some(salt) = get_setting::<String>(pool, SALT_KEY).await? {
        if !salt.is_empty() {
            return Ok(salt);
        }
    }

    let generated = generate_salt();
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SALT_KEY)
        .bind(&generated)
        .execute(pool)
        .await?;

    // Another process may have won the insert
    let stored = get_setting::<String>(pool, SALT_KEY)
        .await?
        .ok_or_else(|| Error::Internal("Salt missing after initialization".to_string()))?;
    if stored == generated {
        tracing::info!("Generated new address hashing salt");
    }
    Ok(stored)
}

/// Generic setting getter
pub async fn get_setting<T>(pool: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(pool: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
