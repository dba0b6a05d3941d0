//! HTTP API handlers for rollcall-ri
//!
//! REST endpoints plus one SSE stream for ingestion events.

pub mod analytics;
pub mod districts;
pub mod health;
pub mod ingest;
pub mod lookup;
pub mod providers;
pub mod representatives;
pub mod reviews;
pub mod sse;

pub use analytics::analytics_routes;
pub use districts::district_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use lookup::lookup_routes;
pub use providers::provider_routes;
pub use representatives::representative_routes;
pub use reviews::review_routes;
pub use sse::event_stream;
