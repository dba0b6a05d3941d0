//! Local JSON file provider
//!
//! Serves a provider payload from disk, paged by numeric offset cursor. Used
//! for offline seeding and for fixtures. The file is re-read on every fetch so
//! edits show up on the next cycle.

use super::normalize;
use super::{FetchPage, ProviderProfile, SourceAdapter, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use rollcall_common::config::{FieldMapping, ProviderConfig};
use rollcall_common::Error;
use serde_json::Value;
use std::path::PathBuf;

pub struct StaticFileAdapter {
    name: String,
    path: PathBuf,
    page_size: usize,
    mapping: FieldMapping,
    profile: ProviderProfile,
}

impl StaticFileAdapter {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        page_size: usize,
        mapping: FieldMapping,
        profile: ProviderProfile,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            page_size: page_size.max(1),
            mapping,
            profile,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> rollcall_common::Result<Self> {
        let path = config.path.clone().ok_or_else(|| {
            Error::Config(format!("Provider {} (static_file) requires path", config.name))
        })?;
        Ok(Self::new(
            config.name.clone(),
            path,
            config.page_size as usize,
            config.mapping.clone(),
            ProviderProfile {
                reliability: config.reliability,
                staleness: chrono::Duration::hours(config.staleness_hours as i64),
            },
        ))
    }
}

#[async_trait]
impl SourceAdapter for StaticFileAdapter {
    fn provider(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> ProviderProfile {
        self.profile
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<FetchPage, SourceError> {
        let offset = match cursor {
            None => 0,
            Some(raw) => raw.parse::<usize>().map_err(|_| SourceError::Rejected {
                provider: self.name.clone(),
                reason: format!("invalid cursor: {}", raw),
            })?,
        };

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::unavailable(&self.name, format!("read {} failed: {}", self.path.display(), e))
        })?;
        let payload: Value = serde_json::from_str(&content).map_err(|e| {
            SourceError::unavailable(&self.name, format!("parse {} failed: {}", self.path.display(), e))
        })?;

        let items = normalize::page_items(&self.name, &payload, &self.mapping)?;
        let end = (offset + self.page_size).min(items.len());
        let page = items.get(offset..end).unwrap_or(&[]);

        let (records, skipped) =
            normalize::records_from_items(&self.name, page, &self.mapping, Utc::now());
        let has_more = end < items.len();

        Ok(FetchPage {
            records,
            skipped,
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }
}
