//! Source adapters: one per external representative data provider
//!
//! Every adapter turns provider payloads into [`SourceRecord`]s and declares a
//! static reliability weight. Pagination is adapter-owned; throttling and
//! retries are not (see [`crate::scheduler`]).
//!
//! # Failure contract
//! - A malformed item is skipped, logged and counted in [`FetchPage::skipped`]
//! - An unreachable provider returns [`SourceError::Unavailable`], which the
//!   scheduler retries with backoff

pub mod json_feed;
pub mod normalize;
pub mod static_file;

pub use json_feed::JsonFeedAdapter;
pub use static_file::StaticFileAdapter;

use crate::types::SourceRecord;
use async_trait::async_trait;
use rollcall_common::config::{ProviderConfig, ProviderKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by source adapters
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Provider unreachable, timing out, or rate limiting us; retryable
    #[error("Source unavailable ({provider}): {reason}")]
    Unavailable {
        provider: String,
        reason: String,
        /// Provider-requested wait (Retry-After)
        retry_after: Option<Duration>,
    },

    /// A single item failed normalization; the batch continues
    #[error("Malformed record from {provider} ({native_id:?}): {reason}")]
    Malformed {
        provider: String,
        native_id: Option<String>,
        reason: String,
    },

    /// Provider refused the request (credentials, unknown endpoint); not retried
    #[error("Source rejected request ({provider}): {reason}")]
    Rejected { provider: String, reason: String },
}

impl SourceError {
    pub fn unavailable(provider: &str, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            provider: provider.to_string(),
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable { .. })
    }
}

/// One page of a provider fetch
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub records: Vec<SourceRecord>,
    /// Items skipped as malformed
    pub skipped: usize,
    /// Cursor to resume from; `None` restarts from the beginning next cycle
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Static scoring profile of a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderProfile {
    /// Reliability weight (0.0-1.0)
    pub reliability: f64,
    /// Age at which a record reaches the recency floor
    pub staleness: chrono::Duration,
}

/// Provider adapter interface
///
/// # Example
/// ```rust,ignore
/// let page = adapter.fetch(cursor.as_deref()).await?;
/// for record in page.records {
///     pipeline.ingest_record(record).await?;
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider name used in the crosswalk and provenance tags
    fn provider(&self) -> &str;

    fn profile(&self) -> ProviderProfile;

    /// Fetch one page starting after `cursor` (`None` = from the beginning)
    async fn fetch(&self, cursor: Option<&str>) -> Result<FetchPage, SourceError>;
}

/// Registry dispatching to adapters by provider name
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters from configuration
    ///
    /// `api_keys` holds credentials already resolved from the settings table,
    /// environment and TOML, keyed by provider name.
    pub fn from_config(
        providers: &[ProviderConfig],
        api_keys: &HashMap<String, String>,
    ) -> rollcall_common::Result<Self> {
        let mut registry = Self::new();
        for config in providers {
            let adapter: Arc<dyn SourceAdapter> = match config.kind {
                ProviderKind::JsonFeed => Arc::new(JsonFeedAdapter::new(
                    config.clone(),
                    api_keys.get(&config.name).cloned(),
                )?),
                ProviderKind::StaticFile => Arc::new(StaticFileAdapter::from_config(config)?),
            };
            registry.register(adapter);
        }
        Ok(registry)
    }

    /// Add or replace an adapter
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        tracing::info!(provider = adapter.provider(), "Registered source adapter");
        self.adapters.insert(adapter.provider().to_string(), adapter);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(provider).cloned()
    }

    /// Provider names in stable order
    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.adapters.values()
    }

    pub fn profiles(&self) -> HashMap<String, ProviderProfile> {
        self.adapters
            .iter()
            .map(|(name, adapter)| (name.clone(), adapter.profile()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
