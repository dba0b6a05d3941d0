//! Paginated HTTP JSON provider
//!
//! Request: `GET {base_url}?limit={page_size}&cursor={cursor}&{api_key_param}={key}`.
//! The response shape is described by the provider's [`FieldMapping`]
//! (record array pointer, next-cursor pointer, per-field pointers).
//!
//! Throttling and retries belong to the scheduler; this adapter makes exactly
//! one request per `fetch`.

use super::normalize;
use super::{FetchPage, ProviderProfile, SourceAdapter, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rollcall_common::config::{FieldMapping, ProviderConfig};
use rollcall_common::Error;
use serde_json::Value;
use std::time::Duration;

pub struct JsonFeedAdapter {
    client: Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    api_key_param: String,
    page_size: u32,
    mapping: FieldMapping,
    profile: ProviderProfile,
}

impl JsonFeedAdapter {
    pub fn new(config: ProviderConfig, api_key: Option<String>) -> rollcall_common::Result<Self> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            Error::Config(format!("Provider {} (json_feed) requires base_url", config.name))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("rollcall-ri/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.or(config.api_key.clone()),
            api_key_param: config.api_key_param.clone(),
            page_size: config.page_size,
            profile: ProviderProfile {
                reliability: config.reliability,
                staleness: chrono::Duration::hours(config.staleness_hours as i64),
            },
            mapping: config.mapping,
            name: config.name,
        })
    }

    fn unavailable(&self, reason: impl Into<String>, retry_after: Option<Duration>) -> SourceError {
        SourceError::Unavailable {
            provider: self.name.clone(),
            reason: reason.into(),
            retry_after,
        }
    }
}

/// Parse a `Retry-After` header given in seconds
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl SourceAdapter for JsonFeedAdapter {
    fn provider(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> ProviderProfile {
        self.profile
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<FetchPage, SourceError> {
        let mut query: Vec<(&str, String)> = vec![("limit", self.page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        if let Some(key) = &self.api_key {
            query.push((self.api_key_param.as_str(), key.clone()));
        }

        tracing::debug!(provider = %self.name, cursor = ?cursor, "Fetching provider page");

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            // without_url keeps the credential query parameter out of the message
            .map_err(|e| self.unavailable(format!("request failed: {}", e.without_url()), None))?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                return Err(self.unavailable(format!("status {}", status), retry_after(&response)));
            }
            s if s.is_server_error() => {
                return Err(self.unavailable(format!("status {}", s), retry_after(&response)));
            }
            s => {
                return Err(SourceError::Rejected {
                    provider: self.name.clone(),
                    reason: format!("status {}", s),
                });
            }
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid JSON: {}", e.without_url()), None))?;

        let items = normalize::page_items(&self.name, &payload, &self.mapping)?;
        let (records, skipped) =
            normalize::records_from_items(&self.name, items, &self.mapping, Utc::now());
        let next_cursor = normalize::next_cursor(&payload, &self.mapping);

        tracing::debug!(
            provider = %self.name,
            records = records.len(),
            skipped,
            has_more = next_cursor.is_some(),
            "Provider page fetched"
        );

        Ok(FetchPage {
            records,
            skipped,
            has_more: next_cursor.is_some(),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::config::ProviderKind;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: "openstates".into(),
            kind: ProviderKind::JsonFeed,
            base_url: base_url.map(str::to_string),
            path: None,
            api_key: Some("toml-key".into()),
            api_key_param: "apikey".into(),
            requests_per_second: 2,
            burst: 1,
            reliability: 0.8,
            staleness_hours: 48,
            page_size: 25,
            mapping: FieldMapping::default(),
        }
    }

    #[test]
    fn test_new_requires_base_url() {
        assert!(matches!(JsonFeedAdapter::new(config(None), None), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolved_key_overrides_toml_key() {
        let adapter =
            JsonFeedAdapter::new(config(Some("http://localhost:9/people")), Some("db-key".into()))
                .unwrap();
        assert_eq!(adapter.api_key.as_deref(), Some("db-key"));
        assert_eq!(adapter.profile().staleness, chrono::Duration::hours(48));
        assert_eq!(adapter.provider(), "openstates");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 9 (discard) is closed on test hosts
        let adapter = JsonFeedAdapter::new(config(Some("http://127.0.0.1:9/people")), None).unwrap();
        let err = adapter.fetch(None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.to_string().contains("toml-key"));
    }

    async fn adapter_for(server: &MockServer, template: ResponseTemplate) -> JsonFeedAdapter {
        Mock::given(method("GET"))
            .and(path("/people"))
            .respond_with(template)
            .mount(server)
            .await;
        JsonFeedAdapter::new(config(Some(&format!("{}/people", server.uri()))), None).unwrap()
    }

    #[tokio::test]
    async fn test_throttling_and_server_errors_are_unavailable() {
        let server = MockServer::start().await;
        let adapter =
            adapter_for(&server, ResponseTemplate::new(429).insert_header("Retry-After", "7")).await;

        match adapter.fetch(None).await.unwrap_err() {
            SourceError::Unavailable { retry_after, reason, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
                assert!(reason.contains("429"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }

        for status in [408u16, 500, 503] {
            let server = MockServer::start().await;
            let adapter = adapter_for(&server, ResponseTemplate::new(status)).await;
            let err = adapter.fetch(None).await.unwrap_err();
            assert!(err.is_retryable(), "status {} should be retryable", status);
            assert!(matches!(err, SourceError::Unavailable { retry_after: None, .. }));
        }
    }

    #[tokio::test]
    async fn test_refusals_are_rejected() {
        for status in [401u16, 403, 404] {
            let server = MockServer::start().await;
            let adapter = adapter_for(&server, ResponseTemplate::new(status)).await;
            let err = adapter.fetch(None).await.unwrap_err();
            assert!(!err.is_retryable());
            assert!(matches!(err, SourceError::Rejected { .. }), "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_mapped_page_parses_records_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people"))
            .and(query_param("limit", "25"))
            .and(query_param("cursor", "p1"))
            .and(query_param("apikey", "toml-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "items": [
                        {
                            "ident": "ocd-person/1",
                            "person": { "full_name": "Tammy Duckworth" },
                            "role": { "chamber": "federal", "region": "Illinois" },
                            "phone": "202-224-2854"
                        },
                        { "ident": "ocd-person/2", "person": {}, "role": { "chamber": "federal", "region": "IL" } }
                    ]
                },
                "meta": { "next": "p2" }
            })))
            .mount(&server)
            .await;

        let mut provider = config(Some(&format!("{}/people", server.uri())));
        provider.mapping.records = "/data/items".into();
        provider.mapping.next_cursor = "/meta/next".into();
        provider.mapping.id = "/ident".into();
        provider.mapping.name = "/person/full_name".into();
        provider.mapping.level = "/role/chamber".into();
        provider.mapping.state = "/role/region".into();
        let adapter = JsonFeedAdapter::new(provider, None).unwrap();

        let page = adapter.fetch(Some("p1")).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.next_cursor.as_deref(), Some("p2"));
        assert!(page.has_more);

        let record = &page.records[0];
        assert_eq!(record.provider, "openstates");
        assert_eq!(record.native_id, "ocd-person/1");
        assert_eq!(record.name, "Tammy Duckworth");
        assert_eq!(record.jurisdiction.state, "IL");
        assert_eq!(record.contacts.phone.as_deref(), Some("202-224-2854"));
    }

    #[tokio::test]
    async fn test_last_page_has_no_more() {
        let server = MockServer::start().await;
        let adapter =
            adapter_for(&server, ResponseTemplate::new(200).set_body_json(json!({ "results": [] }))).await;

        let page = adapter.fetch(None).await.unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }
}
