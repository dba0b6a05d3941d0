//! rollcall-ri library interface
//!
//! Representative Index: ingests representative records from several
//! providers, reconciles them into canonical persons, and answers "who
//! represents this address" without retaining the address.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod districts;
pub mod error;
pub mod fusion;
pub mod geo;
pub mod ingest;
pub mod lookup;
pub mod resolver;
pub mod scheduler;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use adapters::AdapterRegistry;
use axum::Router;
use chrono::{DateTime, Utc};
use fusion::QualityScorer;
use geo::GeocodingLayer;
use ingest::reconcile::Reconciler;
use ingest::{IngestPipeline, IngestSettings};
use lookup::LookupService;
use resolver::IdentityResolver;
use rollcall_common::config::TomlConfig;
use rollcall_common::events::EventBus;
use scheduler::FetchScheduler;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub scheduler: Arc<dyn FetchScheduler>,
    pub resolver: Arc<IdentityResolver>,
    pub reconciler: Arc<Reconciler>,
    pub pipeline: Arc<IngestPipeline>,
    pub lookup: Arc<LookupService>,
    pub analytics_enabled: bool,
    /// Smallest bucket size analytics will ever report
    pub k_anonymity: u32,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire every component from its parts
    ///
    /// Adapters, scheduler and geocoding layer are passed in so tests can
    /// substitute fakes.
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        registry: AdapterRegistry,
        scheduler: Arc<dyn FetchScheduler>,
        geo: GeocodingLayer,
        config: &TomlConfig,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            registry.profiles(),
            scheduler.clone(),
            QualityScorer::with_floor(config.scoring.recency_floor),
            event_bus.clone(),
        ));
        let resolver = Arc::new(IdentityResolver::new(db.clone(), event_bus.clone()));
        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            registry,
            scheduler.clone(),
            resolver.clone(),
            reconciler.clone(),
            event_bus.clone(),
            IngestSettings::from_config(&config.ingest, &config.scoring),
        ));
        let lookup = Arc::new(LookupService::new(
            db.clone(),
            Arc::new(geo),
            config.privacy.analytics_enabled,
        ));

        Self {
            db,
            event_bus,
            scheduler,
            resolver,
            reconciler,
            pipeline,
            lookup,
            analytics_enabled: config.privacy.analytics_enabled,
            k_anonymity: config.privacy.k_anonymity.max(1),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn set_last_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::lookup_routes())
        .merge(api::representative_routes())
        .merge(api::review_routes())
        .merge(api::ingest_routes())
        .merge(api::provider_routes())
        .merge(api::district_routes())
        .merge(api::analytics_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
