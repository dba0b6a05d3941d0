//! Rate-limited fetch scheduler
//!
//! Owns throttling, retries and provider health for every outbound provider
//! call. Adapters stay oblivious: they make one request per `fetch`.
//!
//! - Per-provider token bucket (`governor` direct limiter)
//! - Global retry policy (exponential backoff with jitter, capped attempts)
//! - Health: last success, consecutive failures, degraded flag

pub mod health;
pub mod retry;

pub use health::{HealthTracker, HealthTransition, ProviderHealth};
pub use retry::{retry_with_backoff, RetryPolicy};

use crate::adapters::{AdapterRegistry, FetchPage, SourceAdapter, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rollcall_common::config::{ProviderConfig, RetryConfig};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl SchedulerError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SchedulerError::Source(SourceError::Unavailable { .. }))
    }
}

/// Token bucket parameters for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl RateLimit {
    fn quota(&self) -> Quota {
        let rate = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// Outcome of one scheduled operation, as seen by health tracking
#[derive(Debug, Clone)]
pub struct ScheduledOutcome {
    pub transition: HealthTransition,
    pub health: ProviderHealth,
}

/// Scheduler interface used by the ingestion pipeline
///
/// Object safe so tests can inject a fake.
#[async_trait]
pub trait FetchScheduler: Send + Sync {
    /// Fetch one page through the provider's limiter and retry policy
    async fn fetch_page(
        &self,
        adapter: &dyn SourceAdapter,
        cursor: Option<&str>,
    ) -> Result<(FetchPage, ScheduledOutcome), (SchedulerError, Option<ScheduledOutcome>)>;

    /// Providers currently excluded from scoring
    async fn degraded_providers(&self) -> HashSet<String>;

    async fn health_snapshot(&self) -> Vec<ProviderHealth>;

    /// Reload persisted health (e.g. at start-up)
    async fn restore_health(&self, health: Vec<ProviderHealth>);

    fn rate_limit(&self, provider: &str) -> Option<RateLimit>;
}

/// Production scheduler
pub struct RateLimitedScheduler {
    limiters: HashMap<String, (RateLimit, Arc<DefaultDirectRateLimiter>)>,
    policy: RetryPolicy,
    health: RwLock<HealthTracker>,
}

impl RateLimitedScheduler {
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            limiters: HashMap::new(),
            policy: RetryPolicy::from_config(retry),
            health: RwLock::new(HealthTracker::new(retry.degrade_after_failures)),
        }
    }

    /// Scheduler with a limiter for every configured provider
    pub fn from_config(providers: &[ProviderConfig], retry: &RetryConfig) -> Self {
        let mut scheduler = Self::new(retry);
        for provider in providers {
            scheduler.register(
                &provider.name,
                RateLimit {
                    requests_per_second: provider.requests_per_second,
                    burst: provider.burst,
                },
                chrono::Duration::hours(provider.staleness_hours as i64),
            );
        }
        scheduler
    }

    /// Scheduler for a registry, using each adapter's staleness and one limit
    pub fn for_registry(registry: &AdapterRegistry, limit: RateLimit, retry: &RetryConfig) -> Self {
        let mut scheduler = Self::new(retry);
        for adapter in registry.adapters() {
            scheduler.register(adapter.provider(), limit, adapter.profile().staleness);
        }
        scheduler
    }

    pub fn register(&mut self, provider: &str, limit: RateLimit, staleness: chrono::Duration) {
        let limiter = Arc::new(RateLimiter::direct(limit.quota()));
        self.limiters.insert(provider.to_string(), (limit, limiter));
        self.health.get_mut().register(provider, staleness);
    }

    /// Run any provider operation under its limiter and the retry policy
    ///
    /// Each attempt waits for a token. Health is updated once per operation,
    /// after retries are exhausted or on success.
    pub async fn schedule<T, F, Fut>(
        &self,
        provider: &str,
        mut operation: F,
    ) -> Result<(T, ScheduledOutcome), (SchedulerError, Option<ScheduledOutcome>)>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, SourceError>> + Send,
        T: Send,
    {
        let Some((_, limiter)) = self.limiters.get(provider) else {
            return Err((SchedulerError::UnknownProvider(provider.to_string()), None));
        };

        let result = retry_with_backoff(provider, &self.policy, || {
            let limiter = limiter.clone();
            let attempt = operation();
            async move {
                limiter.until_ready().await;
                attempt.await
            }
        })
        .await;

        let mut tracker = self.health.write().await;
        match result {
            Ok(value) => {
                let transition = tracker.record_success(provider, Utc::now());
                if transition == HealthTransition::Recovered {
                    tracing::info!(provider, "Provider recovered");
                }
                let health = tracker.get(provider).cloned().unwrap_or_else(|| ProviderHealth::new(provider));
                Ok((value, ScheduledOutcome { transition, health }))
            }
            Err(err) => {
                let transition = tracker.record_failure(provider, &err.to_string(), Utc::now());
                let health = tracker.get(provider).cloned().unwrap_or_else(|| ProviderHealth::new(provider));
                if transition == HealthTransition::Degraded {
                    tracing::warn!(
                        provider,
                        consecutive_failures = health.consecutive_failures,
                        "Provider degraded"
                    );
                }
                Err((err.into(), Some(ScheduledOutcome { transition, health })))
            }
        }
    }
}

#[async_trait]
impl FetchScheduler for RateLimitedScheduler {
    async fn fetch_page(
        &self,
        adapter: &dyn SourceAdapter,
        cursor: Option<&str>,
    ) -> Result<(FetchPage, ScheduledOutcome), (SchedulerError, Option<ScheduledOutcome>)> {
        self.schedule(adapter.provider(), || adapter.fetch(cursor)).await
    }

    async fn degraded_providers(&self) -> HashSet<String> {
        self.health
            .read()
            .await
            .snapshot()
            .into_iter()
            .filter(|h| h.degraded)
            .map(|h| h.provider)
            .collect()
    }

    async fn health_snapshot(&self) -> Vec<ProviderHealth> {
        self.health.read().await.snapshot()
    }

    async fn restore_health(&self, health: Vec<ProviderHealth>) {
        let mut tracker = self.health.write().await;
        for entry in health {
            tracker.restore(entry);
        }
    }

    fn rate_limit(&self, provider: &str) -> Option<RateLimit> {
        self.limiters.get(provider).map(|(limit, _)| *limit)
    }
}
