//! End-to-end controller scenarios against mocked control plane, vendor and
//! pipeline services.

use std::sync::Arc;
use std::time::Duration;

use argus_control::{ControlPlane, StateStore};
use argus_core::Provider;
use argus_publish::Publisher;
use argus_scheduler::{Scheduler, SchedulerConfig};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    control: MockServer,
    vendor: MockServer,
    vector: MockServer,
    scheduler: Scheduler,
}

async fn harness() -> Harness {
    let control = MockServer::start().await;
    let vendor = MockServer::start().await;
    let vector = MockServer::start().await;

    let scheduler = Scheduler::new(
        SchedulerConfig {
            poll_interval: Duration::from_secs(3600),
            lookback_days: 7,
            reload_debounce: Duration::from_millis(200),
        },
        Arc::new(ControlPlane::new(control.uri(), "secret")),
        Arc::new(StateStore::new(control.uri(), "secret")),
        Arc::new(Publisher::new(vector.uri(), None)),
        None,
    );

    Harness {
        control,
        vendor,
        vector,
        scheduler,
    }
}

fn s1_integration(vendor_uri: &str, last_sync_status: &str) -> serde_json::Value {
    let config = serde_json::json!({
        "baseUrl": vendor_uri,
        "apiToken": "tok"
    });
    serde_json::json!({
        "integrations": [{
            "id": "int-s1-1",
            "tenantId": "t-1",
            "name": "prod-s1",
            "type": "sentinelone",
            "provider": "sentinelone",
            "config": config.to_string(),
            "status": "active",
            "lastSyncStatus": last_sync_status
        }]
    })
}

fn empty_page() -> serde_json::Value {
    serde_json::json!({ "data": [], "pagination": { "nextCursor": null } })
}

async fn mount_empty_s1_resources(vendor: &MockServer) {
    for resource in [
        "/web/api/v2.1/threats",
        "/web/api/v2.1/activities",
        "/web/api/v2.1/cloud-detection/alerts",
    ] {
        Mock::given(method("GET"))
            .and(path(resource))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(vendor)
            .await;
    }
}

#[tokio::test]
async fn pending_integration_runs_a_full_sync_and_latches() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .and(query_param("type", "sentinelone"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(s1_integration(&h.vendor.uri(), "pending")),
        )
        .mount(&h.control)
        .await;
    Mock::given(method("GET"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/sync-status"))
        .and(body_partial_json(serde_json::json!({
            "tenantId": "t-1",
            "provider": "sentinelone",
            "status": "success"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.control)
        .await;

    Mock::given(method("GET"))
        .and(path("/web/api/v2.1/threats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "thr-1",
                "threatInfo": {
                    "threatName": "Eicar",
                    "confidenceLevel": "malicious",
                    "createdAt": "2024-07-01T10:00:00Z"
                }
            }],
            "pagination": { "nextCursor": null }
        })))
        .mount(&h.vendor)
        .await;
    for resource in ["/web/api/v2.1/activities", "/web/api/v2.1/cloud-detection/alerts"] {
        Mock::given(method("GET"))
            .and(path(resource))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(&h.vendor)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.vector)
        .await;

    h.scheduler
        .collect(Provider::SentinelOne, false)
        .await
        .unwrap();

    // The first completed backfill must latch the full-sync flag.
    let state_posts: Vec<serde_json::Value> = h
        .control
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method == wiremock::http::Method::POST && r.url.path().ends_with("/state"))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert!(
        state_posts
            .iter()
            .any(|body| body["fullSyncComplete"] == serde_json::json!(true)),
        "expected a state write latching fullSyncComplete, got {state_posts:?}"
    );

    // Exactly one page of one event reached the pipeline.
    let vector_requests = h.vector.received_requests().await.unwrap();
    let ndjson = String::from_utf8(vector_requests[0].body.clone()).unwrap();
    assert_eq!(ndjson.lines().count(), 1);
    let event: serde_json::Value = serde_json::from_str(ndjson.lines().next().unwrap()).unwrap();
    assert_eq!(event["severity"], "critical");
    assert_eq!(event["source"], "sentinelone");
}

#[tokio::test]
async fn returning_integration_resumes_one_second_past_the_checkpoint() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(s1_integration(&h.vendor.uri(), "success")),
        )
        .mount(&h.control)
        .await;
    Mock::given(method("GET"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "state": {
                "tenantId": "t-1",
                "provider": "sentinelone",
                "checkpoint": "2024-07-01T10:00:00Z",
                "fullSyncAt": "2024-06-01T00:00:00Z",
                "fullSyncComplete": true
            }
        })))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/sync-status"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.control)
        .await;

    // Every resource window must open at checkpoint + 1s, so the boundary
    // event is not re-emitted.
    for resource in [
        "/web/api/v2.1/threats",
        "/web/api/v2.1/activities",
        "/web/api/v2.1/cloud-detection/alerts",
    ] {
        Mock::given(method("GET"))
            .and(path(resource))
            .and(query_param("createdAt__gte", "2024-07-01T10:00:01.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .expect(1)
            .mount(&h.vendor)
            .await;
    }

    h.scheduler
        .collect(Provider::SentinelOne, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn resource_error_reports_error_status_and_skips_success_bookkeeping() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(s1_integration(&h.vendor.uri(), "pending")),
        )
        .mount(&h.control)
        .await;
    Mock::given(method("GET"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/state"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/sync-status"))
        .and(body_partial_json(serde_json::json!({ "status": "error" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.control)
        .await;
    Mock::given(method("POST"))
        .and(path("/integrations/collector/sync-status"))
        .and(body_partial_json(serde_json::json!({ "status": "success" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.control)
        .await;

    // A 400 is not retryable: threats fail fast, later resources proceed.
    Mock::given(method("GET"))
        .and(path("/web/api/v2.1/threats"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .mount(&h.vendor)
        .await;
    for resource in ["/web/api/v2.1/activities", "/web/api/v2.1/cloud-detection/alerts"] {
        Mock::given(method("GET"))
            .and(path(resource))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .expect(1)
            .mount(&h.vendor)
            .await;
    }

    h.scheduler
        .collect(Provider::SentinelOne, false)
        .await
        .unwrap();

    // The full-sync latch must not be set after a failed backfill.
    let latched = h
        .control
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method == wiremock::http::Method::POST && r.url.path().ends_with("/state"))
        .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).unwrap())
        .any(|body| body["fullSyncComplete"] == serde_json::json!(true));
    assert!(!latched);
}

#[tokio::test]
async fn control_plane_outage_aborts_the_tick() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.control)
        .await;

    let result = h.scheduler.collect(Provider::SentinelOne, false).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn double_reload_collapses_to_one_resync() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "integrations": []
        })))
        .mount(&h.control)
        .await;

    h.scheduler.trigger_reload("int-s1-1");
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.scheduler.trigger_reload("int-s1-1");

    tokio::time::sleep(Duration::from_millis(700)).await;

    // One resync fetches each vendor's integration list exactly once.
    let listings = h
        .control
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/integrations/collector")
        .count();
    assert_eq!(listings, Provider::ALL.len());
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/integrations/collector"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "integrations": []
        })))
        .mount(&h.control)
        .await;

    assert!(!h.scheduler.is_running());
    h.scheduler.start();
    h.scheduler.start();
    assert!(h.scheduler.is_running());

    tokio::time::sleep(Duration::from_millis(100)).await;

    h.scheduler.stop();
    h.scheduler.stop();
    assert!(!h.scheduler.is_running());
}

#[tokio::test]
async fn cancel_of_unknown_sync_is_a_no_op() {
    let h = harness().await;
    h.scheduler.cancel_sync("never-registered");
}
