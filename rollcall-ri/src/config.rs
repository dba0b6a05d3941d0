//! Runtime configuration resolution for rollcall-ri
//!
//! Provider API keys resolve Database → Environment → TOML. The address
//! hashing salt comes from TOML when set, otherwise from the database (where
//! it is generated once).

use rollcall_common::config::{PrivacyConfig, ProviderConfig};
use rollcall_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

/// Environment variable holding a provider's API key
///
/// `open-states` → `ROLLCALL_OPEN_STATES_API_KEY`
pub fn api_key_env_var(provider: &str) -> String {
    let name: String = provider
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("ROLLCALL_{}_API_KEY", name)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one provider's API key
///
/// **Priority:** Database → ENV → TOML. `None` when no source has one; a
/// provider without a key may still work (public endpoints, static files).
pub async fn resolve_provider_api_key(
    db: &SqlitePool,
    provider: &ProviderConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_provider_api_key(db, &provider.name)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(api_key_env_var(&provider.name))
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = provider.api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        (db_key.is_some(), "database"),
        (env_key.is_some(), "environment"),
        (toml_key.is_some(), "TOML"),
    ]
    .into_iter()
    .filter_map(|(present, name)| present.then_some(name))
    .collect();

    if sources.len() > 1 {
        warn!(
            provider = %provider.name,
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }
    if let Some(source) = sources.first() {
        info!(provider = %provider.name, "API key loaded from {}", source);
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Resolve API keys for every configured provider
pub async fn resolve_provider_api_keys(
    db: &SqlitePool,
    providers: &[ProviderConfig],
) -> Result<HashMap<String, String>> {
    let mut keys = HashMap::new();
    for provider in providers {
        if let Some(key) = resolve_provider_api_key(db, provider).await? {
            keys.insert(provider.name.clone(), key);
        }
    }
    Ok(keys)
}

/// Address hashing salt: TOML when set, else the stored (or generated) one
pub async fn resolve_salt(db: &SqlitePool, privacy: &PrivacyConfig) -> Result<String> {
    if let Some(salt) = privacy.salt.as_deref().filter(|s| is_valid_key(s)) {
        info!("Address hashing salt loaded from TOML config");
        return Ok(salt.to_string());
    }
    crate::db::settings::get_or_init_salt(db).await
}
