//! Address lookup: "who represents this address"
//!
//! The raw address exists only inside [`LookupService::lookup`]; it is never
//! logged, echoed or stored. When analytics are enabled the salted address
//! hash and a coarse (state, federal district) bucket are recorded after the
//! jurisdiction resolves.

use crate::db::analytics;
use crate::districts::{ElectoralDistrictMapper, MappedRepresentative};
use crate::geo::{GeoError, GeocodingLayer, Precision};
use crate::types::{ContactKind, Level};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Store(#[from] rollcall_common::Error),
}

/// Lookup request; `Debug` is redacted so the address cannot reach a log
#[derive(Clone, Deserialize)]
pub struct LookupRequest {
    pub address: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl std::fmt::Debug for LookupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupRequest")
            .field("address", &"<redacted>")
            .field("limit", &self.limit)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub kind: ContactKind,
    pub value: String,
    pub source: String,
    pub primary: bool,
}

/// One representative in a lookup answer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeSummary {
    pub canonical_id: Uuid,
    pub name: String,
    pub office: Option<String>,
    pub level: Level,
    pub state: String,
    pub district: Option<String>,
    pub party: Option<String>,
    pub contacts: Vec<ContactSummary>,
    pub quality_score: u8,
    pub precision: Precision,
}

impl From<&MappedRepresentative> for RepresentativeSummary {
    fn from(mapped: &MappedRepresentative) -> Self {
        let person = &mapped.person;
        let view = &person.view;
        Self {
            canonical_id: person.canonical_id,
            name: view.name.value.clone(),
            office: view.office.as_ref().map(|o| o.value.clone()),
            level: view.jurisdiction.value.level,
            state: view.jurisdiction.value.state.clone(),
            district: view.jurisdiction.value.district.clone(),
            party: view.party.as_ref().map(|p| p.value.clone()),
            contacts: view
                .contacts
                .iter()
                .map(|c| ContactSummary {
                    kind: c.kind,
                    value: c.value.clone(),
                    source: c.source.clone(),
                    primary: c.primary,
                })
                .collect(),
            quality_score: person.quality_score,
            precision: mapped.precision,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    /// Worst of the geocoding precision and every representative's precision
    pub precision: Precision,
    /// Set when the geocoder was bypassed or any level fell back state-wide
    pub fallback: bool,
    pub state: String,
    pub representatives: Vec<RepresentativeSummary>,
}

pub struct LookupService {
    db: SqlitePool,
    geo: Arc<GeocodingLayer>,
    mapper: ElectoralDistrictMapper,
    analytics_enabled: bool,
}

impl LookupService {
    pub fn new(db: SqlitePool, geo: Arc<GeocodingLayer>, analytics_enabled: bool) -> Self {
        Self {
            mapper: ElectoralDistrictMapper::new(db.clone()),
            db,
            geo,
            analytics_enabled,
        }
    }

    pub async fn lookup(&self, request: LookupRequest) -> Result<LookupResponse, LookupError> {
        let resolution = self.geo.resolve(&request.address).await?;
        drop(request.address);

        let jurisdiction = &resolution.jurisdiction;
        debug!(
            address_hash = resolution.fingerprint.short(),
            state = %jurisdiction.state,
            source = ?resolution.source,
            "Resolved lookup jurisdiction"
        );

        if self.analytics_enabled {
            let bucket_district = jurisdiction.codes_at(Level::Federal).first().copied();
            if let Err(e) = analytics::record_lookup(
                &self.db,
                &resolution.fingerprint,
                &jurisdiction.state,
                bucket_district,
                Utc::now(),
            )
            .await
            {
                warn!("Failed to record lookup analytics: {}", e);
            }
        }

        let mapping = self
            .mapper
            .representatives_for(jurisdiction, Utc::now().date_naive(), request.limit)
            .await?;

        let geo_precision = resolution.precision();
        let precision = mapping
            .worst_precision()
            .map_or(geo_precision, |worst| worst.max(geo_precision));

        let fallback = resolution.is_fallback() || !mapping.fallback_levels.is_empty();
        if fallback {
            debug!(precision = precision.as_str(), source = ?resolution.source, "Lookup answered from fallback");
        }

        Ok(LookupResponse {
            precision,
            fallback,
            state: jurisdiction.state.clone(),
            representatives: mapping.representatives.iter().map(RepresentativeSummary::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::geo::{
        AddressHasher, DistrictRef, GeocodeError, Geocoder, NormalizedAddress, ResolvedJurisdiction,
    };
    use async_trait::async_trait;
    use rollcall_common::config::GeocoderConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Answers IL-13 until switched off
    struct SwitchableGeocoder {
        down: AtomicBool,
    }

    #[async_trait]
    impl Geocoder for SwitchableGeocoder {
        fn name(&self) -> &str {
            "switchable"
        }

        async fn geocode(&self, _address: &NormalizedAddress) -> Result<ResolvedJurisdiction, GeocodeError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GeocodeError::Unavailable("maintenance".into()));
            }
            Ok(ResolvedJurisdiction {
                state: "IL".into(),
                districts: vec![DistrictRef { level: Level::Federal, code: "13".into() }],
            })
        }
    }

    fn request(address: &str) -> LookupRequest {
        LookupRequest {
            address: address.to_string(),
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_expired_mapping_reports_stale_fallback() {
        let geocoder = Arc::new(SwitchableGeocoder { down: AtomicBool::new(false) });
        let config = GeocoderConfig {
            cache_ttl_secs: 0,
            ..GeocoderConfig::default()
        };
        let layer = GeocodingLayer::new(Some(geocoder.clone()), AddressHasher::new("s"), &config);
        let pool = init_memory_database().await.unwrap();
        let service = LookupService::new(pool, Arc::new(layer), false);

        let fresh = service.lookup(request("9 Elm St, Peoria, IL")).await.unwrap();
        assert_eq!(fresh.precision, Precision::District);
        assert!(!fresh.fallback);

        geocoder.down.store(true, Ordering::SeqCst);
        let cached = service.lookup(request("9 Elm St, Peoria, IL")).await.unwrap();
        assert_eq!(cached.state, "IL");
        assert_eq!(cached.precision, Precision::Stale);
        assert!(cached.fallback);
    }

    #[test]
    fn test_request_debug_never_shows_address() {
        let request = LookupRequest {
            address: "742 Evergreen Terrace, Springfield".to_string(),
            limit: Some(3),
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("Evergreen"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_precision_serializes_with_hyphen() {
        let json = serde_json::to_value(Precision::StateOnly).unwrap();
        assert_eq!(json, "state-only");
    }
}
