//! Integration tests for the HTTP catalog client against a local stub server
//!
//! These tests verify:
//! - Query shapes for summary and version requests
//! - Status and malformed-body error mapping
//! - Rate gate spacing between consecutive requests
//! - Pagination and bearer credential handling

mod common;

use common::{StubServer, ids};
use modwatch::services::{CatalogError, CatalogRequest, CatalogSource};
use modwatch::{CatalogClient, MemoryStorage, RateLimitedFetcher, Tracker, TrackerOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn client_for(server: &StubServer, token: &str, gap: Duration) -> CatalogClient {
    CatalogClient::new(RateLimitedFetcher::new(
        &server.base_url,
        token,
        gap,
        Duration::from_secs(5),
    ))
}

fn summaries_body(items: serde_json::Value, current: u64, last: u64) -> String {
    json!({
        "success": true,
        "data": items,
        "meta": {"current_page": current, "last_page": last}
    })
    .to_string()
}

#[tokio::test]
async fn test_latest_version_query_and_normalization() {
    let server = StubServer::start(|_| {
        let body = json!({
            "data": [
                {"id": 901, "version": "3.2.0", "spt_version_constraint": "~3.10.0"},
                {"id": 850, "version": "3.1.0", "spt_version_constraint": "~3.9.0"}
            ],
            "links": {"next": null}
        });
        (200, body.to_string())
    })
    .await;
    let client = client_for(&server, "secret", Duration::ZERO);

    let latest = client.latest_version("42").await.unwrap().unwrap();

    assert_eq!(latest.id.as_deref(), Some("901"));
    assert_eq!(latest.version.as_deref(), Some("3.2.0"));
    assert_eq!(latest.compatibility_constraint.as_deref(), Some("~3.10.0"));

    let targets = server.targets();
    assert_eq!(targets.len(), 1);
    assert!(targets[0].starts_with("/api/mod/42/versions?"));
    assert!(targets[0].contains("page=1"));
    assert!(targets[0].contains("spt_version_constraint"));

    let head = server.requests()[0].to_lowercase();
    assert!(head.contains("authorization: bearer secret"));
}

#[tokio::test]
async fn test_empty_version_list_is_none() {
    let server = StubServer::start(|_| (200, json!({"data": []}).to_string())).await;
    let client = client_for(&server, "", Duration::ZERO);

    assert_eq!(client.latest_version("1").await.unwrap(), None);

    let head = server.requests()[0].to_lowercase();
    assert!(!head.contains("authorization:"));
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let server = StubServer::start(|_| (500, "{}".to_string())).await;
    let client = client_for(&server, "t", Duration::ZERO);

    match client.latest_version("1").await {
        Err(CatalogError::Status { status, url }) => {
            assert_eq!(status, 500);
            assert!(url.ends_with("/mod/1/versions"));
        }
        other => panic!("Expected Status error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_maps_to_malformed() {
    let server = StubServer::start(|_| (200, "<html>oops</html>".to_string())).await;
    let client = client_for(&server, "t", Duration::ZERO);

    assert!(matches!(
        client.latest_version("1").await,
        Err(CatalogError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_unsafe_mod_id_is_rejected_without_a_request() {
    let server = StubServer::start(|_| (200, json!({"data": []}).to_string())).await;
    let client = client_for(&server, "", Duration::ZERO);

    for id in ["12/../mods", "1?page=9", "a b"] {
        match client.latest_version(id).await {
            Err(CatalogError::InvalidId { id: rejected }) => assert_eq!(rejected, id),
            other => panic!("Expected InvalidId for {id:?}, got: {:?}", other),
        }
    }

    assert!(server.targets().is_empty());
}

#[tokio::test]
async fn test_unreachable_host_maps_to_transport() {
    let fetcher = RateLimitedFetcher::new(
        "http://127.0.0.1:1/api",
        "",
        Duration::ZERO,
        Duration::from_secs(2),
    );

    assert!(matches!(
        fetcher.fetch(&CatalogRequest::new("mods")).await,
        Err(CatalogError::Transport { .. })
    ));
}

#[tokio::test]
async fn test_rate_gate_spaces_consecutive_requests() {
    let server = StubServer::start(|_| (200, json!({"data": []}).to_string())).await;
    let gap = Duration::from_millis(100);
    let client = client_for(&server, "", gap);

    let started = Instant::now();
    for id in ["1", "2", "3", "4"] {
        client.latest_version(id).await.unwrap();
    }

    assert!(started.elapsed() >= gap * 3);
    assert_eq!(server.targets().len(), 4);
}

#[tokio::test]
async fn test_summaries_walk_every_page() {
    let server = StubServer::start(|target| {
        if target.contains("page=2") {
            (
                200,
                summaries_body(json!([{"id": 3, "name": "Third", "detail_url": "https://c.test/3"}]), 2, 2),
            )
        } else {
            (
                200,
                summaries_body(
                    json!([
                        {"id": 1, "name": "First"},
                        {"id": 2, "name": "  "},
                        {"name": "no id"}
                    ]),
                    1,
                    2,
                ),
            )
        }
    })
    .await;
    let client = client_for(&server, "", Duration::ZERO);

    let summaries = client.fetch_summaries(&ids(&["1", "2", "3"])).await.unwrap();

    let found: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(found, vec!["1", "2", "3"]);
    assert_eq!(summaries[1].name, "");
    assert_eq!(summaries[2].catalog_url.as_deref(), Some("https://c.test/3"));

    let targets = server.targets();
    assert_eq!(targets.len(), 2);
    assert!(targets[0].starts_with("/api/mods?"));
    assert!(targets[0].contains("filter%5Bid%5D=1%2C2%2C3"));
}

#[tokio::test]
async fn test_tracker_add_and_refresh_over_http() {
    let server = StubServer::start(|target| {
        if target.starts_with("/api/mods?") {
            (200, summaries_body(json!([{"id": 5, "name": "Looting Bots"}]), 1, 1))
        } else {
            (
                200,
                json!({"data": [{"id": 77, "version": "1.6.0", "spt_version_constraint": "~3.11"}]})
                    .to_string(),
            )
        }
    })
    .await;

    let tracker = Tracker::new(
        client_for(&server, "", Duration::ZERO),
        Arc::new(MemoryStorage::new()),
        TrackerOptions::default(),
        tokio::runtime::Handle::current(),
    );

    let report = tracker.add_tracked(&ids(&["5", "6"])).await.unwrap();
    assert_eq!(report.added, ids(&["5"]));
    assert_eq!(report.missing, ids(&["6"]));

    tracker.refresh_now().await;

    let stored = tracker.tracked_mod("5").unwrap();
    assert_eq!(stored.package_version.as_deref(), Some("1.6.0"));
    assert_eq!(stored.compatibility_version.as_deref(), Some("~3.11"));
    assert!(tracker.history().is_empty());
}
