//! Standalone regression tests.
//!
//! Wires a delta bus, an exporter and the scrape router together the way
//! the daemon does, then scrapes `/prometheus` through the router.
//! Deltas omit timestamps so samples are stamped with the receive time
//! and stay inside the default max age.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use skprom_api::build_router;
use skprom_core::{Delta, DeltaBus, ExporterConfig, FilterMode};
use skprom_metrics::Exporter;

const SELF: &str = "vessels.urn:mrn:imo:mmsi:230099999";

fn delta(value: Value) -> Delta {
    serde_json::from_value(value).unwrap()
}

fn started(config: &ExporterConfig) -> (DeltaBus, Arc<Exporter>) {
    let bus = DeltaBus::new();
    let exporter = Arc::new(Exporter::new());
    exporter.start(SELF, config, &bus);
    (bus, exporter)
}

async fn scrape(router: axum::Router) -> (StatusCode, String, String) {
    let req = Request::builder()
        .uri("/prometheus")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn standalone_scrape_empty() {
    let (_bus, exporter) = started(&ExporterConfig::default());
    let (status, content_type, body) = scrape(build_router(exporter)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");
    assert!(body.trim().is_empty());
}

#[tokio::test]
async fn standalone_position_delta_renders_two_gauges() {
    let (bus, exporter) = started(&ExporterConfig::default());
    bus.publish(&delta(json!({
        "context": "vessels.self",
        "updates": [{
            "$source": "gps.0",
            "values": [{"path": "navigation.position", "value": {"latitude": 60.0, "longitude": 24.0}}]
        }]
    })));

    let (_, _, body) = scrape(build_router(exporter)).await;
    let samples: Vec<&str> = body.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(samples.len(), 2);
    assert!(samples[0].starts_with(&format!(
        "navigation_position_latitude{{context=\"{SELF}\",source=\"gps.0\"}} 60 "
    )));
    assert!(samples[1].starts_with(&format!(
        "navigation_position_longitude{{context=\"{SELF}\",source=\"gps.0\"}} 24 "
    )));
    assert!(body.contains("# TYPE navigation_position_latitude gauge\n"));
}

#[tokio::test]
async fn standalone_other_vessels_need_all_scope() {
    let other = json!({
        "context": "vessels.urn:mrn:imo:mmsi:111111111",
        "updates": [{"$source": "ais", "values": [{"path": "navigation.speedOverGround", "value": 5.5}]}]
    });

    let (bus, exporter) = started(&ExporterConfig::default());
    bus.publish(&delta(other.clone()));
    let (_, _, body) = scrape(build_router(exporter)).await;
    assert!(body.is_empty());

    let config: ExporterConfig = serde_json::from_value(json!({"selfOrAll": "All"})).unwrap();
    let (bus, exporter) = started(&config);
    bus.publish(&delta(other));
    let (_, _, body) = scrape(build_router(exporter)).await;
    assert!(body.contains(
        "navigation_speedOverGround{context=\"vessels.urn:mrn:imo:mmsi:111111111\",source=\"ais\"} 5.5 "
    ));
}

#[tokio::test]
async fn standalone_enumerated_strings_and_blacklist() {
    let config = ExporterConfig {
        black_or_white: Some(FilterMode::Exclusive),
        black_or_whitelist: Some(vec!["navigation.lights".to_string()]),
        ..Default::default()
    };
    let (bus, exporter) = started(&config);

    for state in ["motoring", "anchored"] {
        bus.publish(&delta(json!({
            "context": "vessels.self",
            "updates": [{"$source": "n2k", "values": [
                {"path": "navigation.state", "value": state},
                {"path": "navigation.lights", "value": true}
            ]}]
        })));
    }

    let (_, _, body) = scrape(build_router(exporter)).await;
    assert!(body.contains("value_str=\"motoring\"} 1 "));
    assert!(body.contains("value_str=\"anchored\"} 1 "));
    assert_eq!(body.matches("# HELP navigation_state navigation_state\n").count(), 1);
    assert!(!body.contains("navigation_lights"));
}

#[tokio::test]
async fn standalone_stop_empties_scrape() {
    let (bus, exporter) = started(&ExporterConfig::default());
    bus.publish(&delta(json!({
        "context": "vessels.self",
        "updates": [{"$source": "s", "values": [{"path": "a", "value": 1}]}]
    })));
    exporter.stop();
    bus.publish(&delta(json!({
        "context": "vessels.self",
        "updates": [{"$source": "s", "values": [{"path": "b", "value": 2}]}]
    })));

    let (status, _, body) = scrape(build_router(exporter)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn standalone_healthz() {
    let (_bus, exporter) = started(&ExporterConfig::default());
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = build_router(exporter).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
