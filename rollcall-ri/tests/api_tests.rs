//! HTTP API integration tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::http::StatusCode;
use helpers::{rep, with_phone, FakeGeocoder, ScriptedAdapter, TestApp};
use rollcall_ri::geo::{DistrictRef, ResolvedJurisdiction};
use rollcall_ri::types::Level;
use serde_json::json;

fn il_district_7() -> ResolvedJurisdiction {
    ResolvedJurisdiction {
        state: "IL".to_string(),
        districts: vec![DistrictRef {
            level: Level::Federal,
            code: "7".to_string(),
        }],
    }
}

async fn seeded_app() -> TestApp {
    let a = ScriptedAdapter::new(
        "A",
        0.9,
        vec![vec![
            with_phone(rep("a-1", "Dana Cole", Level::Federal, "IL", Some("7")), "312-555-0100"),
            rep("a-2", "Ada Lincoln", Level::Federal, "IL", None),
            rep("a-3", "Eli Moss", Level::Federal, "IL", Some("8")),
        ]],
    );
    let b = ScriptedAdapter::new(
        "B",
        0.6,
        vec![vec![with_phone(rep("b-1", "Dana Cole", Level::Federal, "IL", Some("7")), "312-555-0199")]],
    );
    let app = TestApp::new(vec![a, b], Some(FakeGeocoder::answering(il_district_7()))).await;
    app.cycle().await;
    app
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(vec![], None).await;
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rollcall-ri");
    assert!(body["uptime_seconds"].is_u64());
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_lookup_returns_district_representatives() {
    let app = seeded_app().await;
    let (status, body) = app
        .post("/api/lookup", json!({ "address": "1 Lake Shore Dr, Chicago, IL 60611" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["precision"], "district");
    assert_eq!(body["fallback"], false);
    assert_eq!(body["state"], "IL");

    let reps = body["representatives"].as_array().unwrap();
    let names: Vec<_> = reps.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Ada Lincoln", "Dana Cole"]);

    let dana = &reps[1];
    assert_eq!(dana["level"], "federal");
    assert_eq!(dana["district"], "7");
    assert_eq!(dana["precision"], "district");
    assert!(dana["qualityScore"].as_u64().unwrap() > 0);
    assert!(dana["canonicalId"].is_string());

    let primary_phone = dana["contacts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["kind"] == "phone" && c["primary"] == true)
        .unwrap();
    assert_eq!(primary_phone["value"], "312-555-0100");

    // The address never comes back
    assert!(!body.to_string().contains("Lake Shore"));
}

#[tokio::test]
async fn test_lookup_limit_truncates() {
    let app = seeded_app().await;
    let (status, body) = app
        .post("/api/lookup", json!({ "address": "1 Lake Shore Dr, Chicago, IL", "limit": 1 }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["representatives"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_lookup_errors() {
    let app = TestApp::new(vec![], None).await;

    let (status, body) = app.post("/api/lookup", json!({ "address": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = app
        .post("/api/lookup", json!({ "address": "1 Main St, Springfield", "limit": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/api/lookup", json!({ "address": "42 Nowhere Rd, Atlantis" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNRESOLVABLE_ADDRESS");
    assert!(!body.to_string().contains("Nowhere"));
}

#[tokio::test]
async fn test_representative_read_with_provenance() {
    let app = seeded_app().await;

    let (status, body) = app.get("/api/crosswalk/B/b-1").await;
    assert_eq!(status, StatusCode::OK);
    let id = body["canonicalId"].as_str().unwrap().to_string();
    assert!(body.get("provenance").is_none());

    let (status, body) = app.get(&format!("/api/representatives/{}?provenance=true", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Dana Cole");

    let provenance = &body["provenance"];
    assert_eq!(provenance["fields"]["name"]["source"], "A");
    assert!(provenance["fields"]["name"]["fetchedAt"].is_string());
    assert_eq!(provenance["contributing"].as_array().unwrap().len(), 2);
    assert_eq!(provenance["crosswalk"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_representative_not_found() {
    let app = TestApp::new(vec![], None).await;

    let (status, body) = app
        .get("/api/representatives/00000000-0000-0000-0000-000000000000")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = app.get("/api/crosswalk/A/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_representatives_filter() {
    let app = seeded_app().await;

    let (status, body) = app.get("/api/representatives?level=federal&state=il&district=8").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "Eli Moss");

    let (status, body) = app.get("/api/representatives?state=IL").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, _) = app.get("/api/representatives?state=Narnia").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_review_workflow_over_http() {
    let a = ScriptedAdapter::new(
        "A",
        0.8,
        vec![vec![
            rep("a-1", "John Smith", Level::State, "TX", Some("4")),
            rep("a-2", "John Smith", Level::State, "TX", Some("4")),
        ]],
    );
    let b = ScriptedAdapter::new("B", 0.7, vec![vec![]]);
    let app = TestApp::new(vec![a, b.clone()], None).await;
    app.cycle().await;
    b.set_pages(vec![vec![rep("b-9", "John Smith", Level::State, "TX", Some("4"))]]);
    app.cycle().await;

    let (status, body) = app.get("/api/reviews").await;
    assert_eq!(status, StatusCode::OK);
    let reviews = body.as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    let review_id = reviews[0]["review_id"].as_str().unwrap().to_string();
    let candidate = reviews[0]["candidates"][0].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            &format!("/api/reviews/{}/resolve", review_id),
            json!({ "action": "attach", "canonical_id": "00000000-0000-0000-0000-000000000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &format!("/api/reviews/{}/resolve", review_id),
            json!({ "action": "attach", "canonical_id": candidate }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "attached");
    assert_eq!(body["id"], candidate.as_str());

    let (status, _) = app
        .post(&format!("/api/reviews/{}/resolve", review_id), json!({ "action": "dismiss" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get("/api/reviews").await;
    assert!(body.as_array().unwrap().is_empty());
    let (_, body) = app.get("/api/reviews?status=resolved").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ingest_run_and_provider_status() {
    let a = ScriptedAdapter::new(
        "A",
        0.75,
        vec![
            vec![rep("a-1", "One", Level::Local, "NY", Some("1"))],
            vec![rep("a-2", "Two", Level::Local, "NY", Some("2"))],
        ],
    );
    let mut config = helpers::test_config();
    config.ingest.max_pages_per_cycle = 1;
    let app = TestApp::with_config(vec![a], None, config).await;

    let (status, body) = app.post("/api/ingest/run", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"], 1);
    assert_eq!(body["providers"][0]["created"], 1);

    let (status, body) = app.get("/api/providers").await;
    assert_eq!(status, StatusCode::OK);
    let provider = &body[0];
    assert_eq!(provider["provider"], "A");
    assert_eq!(provider["reliability"], 0.75);
    assert_eq!(provider["degraded"], false);
    assert_eq!(provider["cursor"], "1");
    assert_eq!(provider["rate_limit"]["requests_per_second"], 1000);
    assert!(provider["last_success"].is_string());
}

#[tokio::test]
async fn test_districts_are_listed_after_ingestion() {
    let app = seeded_app().await;

    let (status, body) = app.get("/api/districts?state=IL").await;
    assert_eq!(status, StatusCode::OK);
    let districts: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["district"].clone())
        .collect();
    assert!(districts.contains(&json!("7")));
    assert!(districts.contains(&json!("8")));

    let (status, _) = app.get("/api/districts?state=Atlantis").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics_suppress_small_buckets() {
    let app = seeded_app().await;

    app.post("/api/lookup", json!({ "address": "1 Lake Shore Dr, Chicago, IL" })).await;
    let (status, body) = app.get("/api/analytics/lookups").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["k"], 2);
    assert!(body["buckets"].as_array().unwrap().is_empty());

    app.post("/api/lookup", json!({ "address": "233 S Wacker Dr, Chicago, IL" })).await;
    let (_, body) = app.get("/api/analytics/lookups").await;
    let buckets = body["buckets"].as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["state"], "IL");
    assert_eq!(buckets[0]["district"], "7");

    // A caller cannot lower k below the configured floor
    let (_, body) = app.get("/api/analytics/lookups?k=1").await;
    assert_eq!(body["k"], 2);
}
