//! External geocoding providers
//!
//! A geocoder turns a normalized address into jurisdiction identifiers. The
//! HTTP implementation sends the address in a POST body so it never appears
//! in a URL (and therefore in any proxy or access log).

use super::privacy::NormalizedAddress;
use crate::types::{normalize_district, Level};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// District code at one level of government
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistrictRef {
    pub level: Level,
    pub code: String,
}

/// Jurisdiction identifiers for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedJurisdiction {
    /// Two-letter postal code
    pub state: String,
    /// District codes at each applicable level; empty for state-only
    pub districts: Vec<DistrictRef>,
}

impl ResolvedJurisdiction {
    pub fn state_only(state: &str) -> Self {
        Self {
            state: state.to_string(),
            districts: Vec::new(),
        }
    }

    /// District codes at one level
    pub fn codes_at(&self, level: Level) -> Vec<&str> {
        self.districts
            .iter()
            .filter(|d| d.level == level)
            .map(|d| d.code.as_str())
            .collect()
    }
}

/// Geocoding failures
#[derive(Debug, Clone, Error)]
pub enum GeocodeError {
    #[error("Geocoder unavailable: {0}")]
    Unavailable(String),

    #[error("Geocoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Address could not be resolved")]
    NotFound,

    #[error("Geocoder rejected request: {0}")]
    Rejected(String),
}

/// Geocoding provider interface
#[async_trait]
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &str;

    async fn geocode(
        &self,
        address: &NormalizedAddress,
    ) -> Result<ResolvedJurisdiction, GeocodeError>;
}

#[derive(Debug, Serialize)]
struct GeocodeRequest<'a> {
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    state: Option<String>,
    #[serde(default)]
    districts: Vec<GeocodeDistrict>,
}

#[derive(Debug, Deserialize)]
struct GeocodeDistrict {
    level: String,
    code: String,
}

/// JSON geocoding endpoint
///
/// Request: `POST {url}` with `{"address": "..."}`.
/// Response: `{"state": "IL", "districts": [{"level": "federal", "code": "13"}]}`.
pub struct HttpGeocoder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpGeocoder {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent(concat!("rollcall-ri/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    fn name(&self) -> &str {
        "http"
    }

    async fn geocode(
        &self,
        address: &NormalizedAddress,
    ) -> Result<ResolvedJurisdiction, GeocodeError> {
        let mut request = self.client.post(&self.url).json(&GeocodeRequest {
            address: address.as_str(),
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeocodeError::Unavailable("request timed out".to_string())
            } else {
                // reqwest errors can embed the URL but never the POST body
                GeocodeError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(GeocodeError::NotFound);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GeocodeError::Rejected(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(GeocodeError::Unavailable(format!("status {}", status)));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Unavailable(format!("invalid response: {}", e)))?;

        let state = body
            .state
            .as_deref()
            .and_then(super::states::to_postal_code)
            .ok_or(GeocodeError::NotFound)?;

        let districts = body
            .districts
            .into_iter()
            .filter_map(|d| {
                let level = d.level.parse::<Level>().ok()?;
                let code = normalize_district(&d.code)?;
                Some(DistrictRef { level, code })
            })
            .collect();

        Ok(ResolvedJurisdiction {
            state: state.to_string(),
            districts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::normalize_address;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn geocoder_answering(template: ResponseTemplate) -> (MockServer, HttpGeocoder) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/geocode"))
            .and(header("authorization", "Bearer geo-key"))
            .respond_with(template)
            .mount(&server)
            .await;
        let geocoder = HttpGeocoder::new(
            format!("{}/geocode", server.uri()),
            Some("geo-key".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        (server, geocoder)
    }

    #[test]
    fn test_codes_at_filters_by_level() {
        let resolved = ResolvedJurisdiction {
            state: "IL".into(),
            districts: vec![
                DistrictRef { level: Level::Federal, code: "13".into() },
                DistrictRef { level: Level::State, code: "48".into() },
                DistrictRef { level: Level::State, code: "96".into() },
            ],
        };
        assert_eq!(resolved.codes_at(Level::Federal), vec!["13"]);
        assert_eq!(resolved.codes_at(Level::State), vec!["48", "96"]);
        assert!(resolved.codes_at(Level::Local).is_empty());
    }

    #[test]
    fn test_response_shape_parses() {
        let body: GeocodeResponse = serde_json::from_str(
            r#"{"state": "Illinois", "districts": [{"level": "federal", "code": "013"}]}"#,
        )
        .unwrap();
        assert_eq!(body.districts.len(), 1);
        assert_eq!(body.state.as_deref(), Some("Illinois"));
    }

    #[tokio::test]
    async fn test_http_answer_maps_to_jurisdiction() {
        let (_server, geocoder) = geocoder_answering(ResponseTemplate::new(200).set_body_json(json!({
            "state": "Illinois",
            "districts": [
                { "level": "federal", "code": "013" },
                { "level": "galactic", "code": "x" }
            ]
        })))
        .await;

        let resolved = geocoder
            .geocode(&normalize_address("1 Main St, Urbana, IL"))
            .await
            .unwrap();
        assert_eq!(resolved.state, "IL");
        assert_eq!(resolved.districts, vec![DistrictRef { level: Level::Federal, code: "13".into() }]);
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        let address = normalize_address("1 Main St, Urbana, IL");

        for status in [404u16, 422] {
            let (_server, geocoder) = geocoder_answering(ResponseTemplate::new(status)).await;
            assert!(matches!(geocoder.geocode(&address).await, Err(GeocodeError::NotFound)));
        }
        for status in [401u16, 403] {
            let (_server, geocoder) = geocoder_answering(ResponseTemplate::new(status)).await;
            assert!(matches!(geocoder.geocode(&address).await, Err(GeocodeError::Rejected(_))));
        }
        let (_server, geocoder) = geocoder_answering(ResponseTemplate::new(503)).await;
        assert!(matches!(geocoder.geocode(&address).await, Err(GeocodeError::Unavailable(_))));

        let (_server, geocoder) =
            geocoder_answering(ResponseTemplate::new(200).set_body_json(json!({ "districts": [] }))).await;
        assert!(matches!(geocoder.geocode(&address).await, Err(GeocodeError::NotFound)));
    }
}
