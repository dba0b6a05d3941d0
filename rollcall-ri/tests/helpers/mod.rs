//! Test helper utilities
//!
//! Scripted provider adapters, a controllable geocoder, and a fully wired
//! [`AppState`] over a temporary SQLite database.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use http_body_util::BodyExt;
use rollcall_common::config::{RetryConfig, TomlConfig};
use rollcall_common::events::EventBus;
use rollcall_ri::adapters::{AdapterRegistry, FetchPage, ProviderProfile, SourceAdapter, SourceError};
use rollcall_ri::geo::{
    AddressHasher, GeocodeError, Geocoder, GeocodingLayer, NormalizedAddress, ResolvedJurisdiction,
};
use rollcall_ri::scheduler::{RateLimit, RateLimitedScheduler};
use rollcall_ri::types::{ContactInfo, Jurisdiction, Level, SourceRecord, TermDates};
use rollcall_ri::AppState;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Records
// ============================================================================

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A serving representative as a provider would report it
pub fn rep(native_id: &str, name: &str, level: Level, state: &str, district: Option<&str>) -> SourceRecord {
    SourceRecord {
        record_id: Uuid::new_v4(),
        provider: String::new(),
        native_id: native_id.to_string(),
        name: name.to_string(),
        office: Some(match level {
            Level::Federal if district.is_some() => "U.S. Representative".to_string(),
            Level::Federal => "U.S. Senator".to_string(),
            Level::State => "State Representative".to_string(),
            Level::Local => "Council Member".to_string(),
        }),
        jurisdiction: Jurisdiction::new(level, state, district),
        party: None,
        contacts: ContactInfo::default(),
        term: TermDates {
            start: Some(today() - ChronoDuration::days(400)),
            end: None,
        },
        in_office: None,
        fetched_at: Utc::now(),
    }
}

pub fn with_phone(mut record: SourceRecord, phone: &str) -> SourceRecord {
    record.contacts.phone = Some(phone.to_string());
    record
}

pub fn with_email(mut record: SourceRecord, email: &str) -> SourceRecord {
    record.contacts.email = Some(email.to_string());
    record
}

// ============================================================================
// Adapters
// ============================================================================

/// Adapter serving scripted pages; cursors are page indexes
pub struct ScriptedAdapter {
    name: String,
    profile: ProviderProfile,
    pages: Mutex<Vec<Vec<SourceRecord>>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    cursors_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str, reliability: f64, pages: Vec<Vec<SourceRecord>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            profile: ProviderProfile {
                reliability,
                staleness: ChronoDuration::hours(24),
            },
            pages: Mutex::new(pages),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            cursors_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn set_pages(&self, pages: Vec<Vec<SourceRecord>>) {
        *self.pages.lock().unwrap() = pages;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> ProviderProfile {
        self.profile
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<FetchPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cursors_seen.lock().unwrap().push(cursor.map(str::to_string));

        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(&self.name, "connection refused"));
        }

        let pages = self.pages.lock().unwrap().clone();
        let index: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let now = Utc::now();
        let records = pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut record| {
                record.record_id = Uuid::new_v4();
                record.provider = self.name.clone();
                record.fetched_at = now;
                record
            })
            .collect();

        let has_more = index + 1 < pages.len();
        Ok(FetchPage {
            records,
            skipped: 0,
            next_cursor: has_more.then(|| (index + 1).to_string()),
            has_more,
        })
    }
}

// ============================================================================
// Geocoder
// ============================================================================

/// Geocoder answering after a fixed delay; `None` answers "not found"
pub struct FakeGeocoder {
    pub delay: Duration,
    pub answer: Option<ResolvedJurisdiction>,
    pub calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn answering(answer: ResolvedJurisdiction) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            answer: Some(answer),
            calls: AtomicUsize::new(0),
        })
    }

    /// Never answers within the test timeout
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_secs(30),
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn geocode(&self, _address: &NormalizedAddress) -> Result<ResolvedJurisdiction, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.answer.clone().ok_or(GeocodeError::NotFound)
    }
}

// ============================================================================
// Application
// ============================================================================

/// Configuration tuned for tests: fast retries, quick degradation, short
/// geocoder timeout, analytics on with a small k
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.retry = RetryConfig {
        max_attempts: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        jitter: 0.0,
        degrade_after_failures: 2,
    };
    config.geocoder.timeout_ms = 50;
    config
        .geocoder
        .localities
        .insert("springfield".to_string(), "IL".to_string());
    config.privacy.salt = Some("test-salt".to_string());
    config.privacy.analytics_enabled = true;
    config.privacy.k_anonymity = 2;
    config.ingest.interval_secs = 0;
    config
}

/// Wired application over a temporary database
///
/// Keep the struct alive for the test: dropping it removes the database.
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestApp {
    pub async fn new(adapters: Vec<Arc<ScriptedAdapter>>, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self::with_config(adapters, geocoder, test_config()).await
    }

    pub async fn with_config(
        adapters: Vec<Arc<ScriptedAdapter>>,
        geocoder: Option<Arc<dyn Geocoder>>,
        config: TomlConfig,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = rollcall_ri::db::init_database(&dir.path().join("rollcall.db"))
            .await
            .expect("Failed to initialize database");

        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        let scheduler = Arc::new(RateLimitedScheduler::for_registry(
            &registry,
            RateLimit {
                requests_per_second: 1_000,
                burst: 1_000,
            },
            &config.retry,
        ));

        let salt = config.privacy.salt.clone().unwrap_or_default();
        let geo = GeocodingLayer::new(geocoder, AddressHasher::new(salt), &config.geocoder);

        let state = AppState::new(db, EventBus::new(256), registry, scheduler, geo, &config);
        Self { dir, state }
    }

    pub fn router(&self) -> Router {
        rollcall_ri::build_router(self.state.clone())
    }

    pub async fn cycle(&self) -> rollcall_ri::ingest::CycleReport {
        self.state.pipeline.run_cycle().await.expect("Ingestion cycle failed")
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(self.router(), Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        send(
            self.router(),
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
