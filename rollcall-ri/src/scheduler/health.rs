//! Per-provider health tracking
//!
//! A provider is degraded when either:
//! - its consecutive failed operations reach the configured threshold, or
//! - it fails while its last success is older than its staleness threshold
//!
//! A single success clears the degraded flag.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub degraded: bool,
}

impl ProviderHealth {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            last_success: None,
            last_failure: None,
            last_error: None,
            consecutive_failures: 0,
            degraded: false,
        }
    }
}

/// Degraded flag change caused by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    Degraded,
    Recovered,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    providers: HashMap<String, ProviderHealth>,
    staleness: HashMap<String, Duration>,
    degrade_after_failures: u32,
}

impl HealthTracker {
    pub fn new(degrade_after_failures: u32) -> Self {
        Self {
            providers: HashMap::new(),
            staleness: HashMap::new(),
            degrade_after_failures: degrade_after_failures.max(1),
        }
    }

    pub fn register(&mut self, provider: &str, staleness: Duration) {
        self.staleness.insert(provider.to_string(), staleness);
        self.providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));
    }

    /// Replace a provider's state with a persisted snapshot
    pub fn restore(&mut self, health: ProviderHealth) {
        self.providers.insert(health.provider.clone(), health);
    }

    pub fn record_success(&mut self, provider: &str, now: DateTime<Utc>) -> HealthTransition {
        let health = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));

        let was_degraded = health.degraded;
        health.last_success = Some(now);
        health.consecutive_failures = 0;
        health.last_error = None;
        health.degraded = false;

        if was_degraded {
            HealthTransition::Recovered
        } else {
            HealthTransition::Unchanged
        }
    }

    pub fn record_failure(
        &mut self,
        provider: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> HealthTransition {
        let staleness = self.staleness.get(provider).copied();
        let threshold = self.degrade_after_failures;
        let health = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));

        let was_degraded = health.degraded;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure = Some(now);
        health.last_error = Some(error.to_string());

        let offline_too_long = match (health.last_success, staleness) {
            (Some(last), Some(staleness)) => now - last > staleness,
            _ => false,
        };
        health.degraded = health.consecutive_failures >= threshold || offline_too_long;

        if health.degraded && !was_degraded {
            HealthTransition::Degraded
        } else {
            HealthTransition::Unchanged
        }
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderHealth> {
        self.providers.get(provider)
    }

    pub fn is_degraded(&self, provider: &str) -> bool {
        self.providers.get(provider).is_some_and(|h| h.degraded)
    }

    /// All providers sorted by name
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let mut all: Vec<ProviderHealth> = self.providers.values().cloned().collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }
}
