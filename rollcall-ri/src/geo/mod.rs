//! Privacy-preserving address → jurisdiction resolution
//!
//! Resolution order:
//! 1. Fresh cache entry for the address fingerprint
//! 2. External geocoder, bounded by a timeout
//! 3. Expired cache entry (the last known mapping)
//! 4. State-only resolution from the address text itself
//!
//! Only when all four fail does the caller see [`GeoError::Unresolvable`].
//! The normalized address is dropped when [`GeocodingLayer::resolve`] returns.

pub mod cache;
pub mod geocoder;
pub mod privacy;
pub mod states;

pub use cache::{CacheHit, JurisdictionCache};
pub use geocoder::{DistrictRef, GeocodeError, Geocoder, HttpGeocoder, ResolvedJurisdiction};
pub use privacy::{normalize_address, AddressFingerprint, AddressHasher, NormalizedAddress};

use rollcall_common::config::GeocoderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Precision of a lookup result, from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "district")]
    District,
    #[serde(rename = "state-only")]
    StateOnly,
    #[serde(rename = "stale")]
    Stale,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::District => "district",
            Precision::StateOnly => "state-only",
            Precision::Stale => "stale",
        }
    }
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Geocoder,
    ExpiredCache,
    AddressText,
}

/// Outcome of resolving one address
#[derive(Debug, Clone)]
pub struct GeoResolution {
    pub fingerprint: AddressFingerprint,
    pub jurisdiction: ResolvedJurisdiction,
    pub source: ResolutionSource,
}

impl GeoResolution {
    /// Stale for a mapping past its TTL, state-only when no district codes
    /// are known
    pub fn precision(&self) -> Precision {
        if self.source == ResolutionSource::ExpiredCache {
            Precision::Stale
        } else if self.jurisdiction.districts.is_empty() {
            Precision::StateOnly
        } else {
            Precision::District
        }
    }

    /// Any path other than a fresh answer
    pub fn is_fallback(&self) -> bool {
        matches!(
            self.source,
            ResolutionSource::ExpiredCache | ResolutionSource::AddressText
        )
    }
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Address is empty")]
    EmptyAddress,

    /// Total geocoding failure with no cached or offline fallback
    #[error("Address could not be resolved to a jurisdiction")]
    Unresolvable,
}

pub struct GeocodingLayer {
    geocoder: Option<Arc<dyn Geocoder>>,
    cache: JurisdictionCache,
    hasher: AddressHasher,
    timeout: Duration,
    /// Lower-case locality → postal code
    localities: HashMap<String, String>,
}

impl GeocodingLayer {
    pub fn new(
        geocoder: Option<Arc<dyn Geocoder>>,
        hasher: AddressHasher,
        config: &GeocoderConfig,
    ) -> Self {
        let localities = config
            .localities
            .iter()
            .filter_map(|(locality, state)| {
                let code = states::to_postal_code(state)?;
                Some((privacy::normalize_address(locality).as_str().to_string(), code.to_string()))
            })
            .collect();

        Self {
            geocoder,
            cache: JurisdictionCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_capacity,
            ),
            hasher,
            timeout: Duration::from_millis(config.timeout_ms),
            localities,
        }
    }

    /// Build from configuration, with an HTTP geocoder when a URL is set
    pub fn from_config(
        config: &GeocoderConfig,
        hasher: AddressHasher,
    ) -> Result<Self, GeocodeError> {
        let geocoder: Option<Arc<dyn Geocoder>> = match &config.url {
            Some(url) => Some(Arc::new(HttpGeocoder::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?)),
            None => None,
        };
        Ok(Self::new(geocoder, hasher, config))
    }

    pub fn hasher(&self) -> &AddressHasher {
        &self.hasher
    }

    /// Resolve a raw address without retaining it
    pub async fn resolve(&self, raw_address: &str) -> Result<GeoResolution, GeoError> {
        let normalized = normalize_address(raw_address);
        if normalized.is_empty() {
            return Err(GeoError::EmptyAddress);
        }
        let fingerprint = self.hasher.fingerprint(&normalized);

        let expired = match self.cache.get(&fingerprint).await {
            Some(CacheHit::Fresh(jurisdiction)) => {
                debug!(address_hash = fingerprint.short(), "Jurisdiction cache hit");
                return Ok(GeoResolution {
                    fingerprint,
                    jurisdiction,
                    source: ResolutionSource::Cache,
                });
            }
            Some(CacheHit::Expired(jurisdiction)) => Some(jurisdiction),
            None => None,
        };

        if let Some(geocoder) = &self.geocoder {
            match tokio::time::timeout(self.timeout, geocoder.geocode(&normalized)).await {
                Ok(Ok(jurisdiction)) => {
                    self.cache.insert(fingerprint.clone(), jurisdiction.clone()).await;
                    return Ok(GeoResolution {
                        fingerprint,
                        jurisdiction,
                        source: ResolutionSource::Geocoder,
                    });
                }
                Ok(Err(err)) => {
                    warn!(
                        geocoder = geocoder.name(),
                        address_hash = fingerprint.short(),
                        error = %err,
                        "Geocoding failed, falling back"
                    );
                }
                Err(_) => {
                    let err = GeocodeError::Timeout(self.timeout);
                    warn!(
                        geocoder = geocoder.name(),
                        address_hash = fingerprint.short(),
                        error = %err,
                        "Geocoding failed, falling back"
                    );
                }
            }
        }

        if let Some(jurisdiction) = expired {
            return Ok(GeoResolution {
                fingerprint,
                jurisdiction,
                source: ResolutionSource::ExpiredCache,
            });
        }

        match self.state_from_text(&normalized) {
            Some(state) => Ok(GeoResolution {
                fingerprint,
                jurisdiction: ResolvedJurisdiction::state_only(state),
                source: ResolutionSource::AddressText,
            }),
            None => Err(GeoError::Unresolvable),
        }
    }

    fn state_from_text<'a>(&'a self, normalized: &NormalizedAddress) -> Option<&'a str> {
        if let Some(state) = states::find_in_address(normalized.as_str()) {
            return Some(state);
        }
        normalized
            .as_str()
            .split(", ")
            .skip(1)
            .find_map(|component| self.localities.get(component).map(String::as_str))
    }
}
