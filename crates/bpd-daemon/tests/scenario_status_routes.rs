//! In-process scenario tests for the bpd status API.
//!
//! # Invariants under test
//! - `GET /v1/health` answers `{ ok, service, version }`.
//! - `GET /v1/machines` reflects the latest published controller status and
//!   exposes only the public projection (no internal error text).
//! - Unknown routes are 404.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use bpd_daemon::{routes, state::AppState};
use bpd_runtime::{ControllerState, ControllerStatus, StatusBoard};
use bpd_schemas::MachineId;
use http_body_util::BodyExt;
use tokio::sync::watch;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn get(router: axum::Router, uri: &str) -> (StatusCode, bytes::Bytes) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = routes::build_router(Arc::new(AppState::default()));
    let (status, body) = get(router, "/v1/health").await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "bpd-daemon");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// ---------------------------------------------------------------------------
// GET /v1/machines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn machines_is_empty_array_without_controllers() {
    let router = routes::build_router(Arc::new(AppState::default()));
    let (status, body) = get(router, "/v1/machines").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body), serde_json::json!([]));
}

#[tokio::test]
async fn machines_reflects_latest_controller_status() {
    let (oci1_tx, oci1_rx) = watch::channel(ControllerStatus::idle(MachineId::new("oci1")));
    let (_oci2_tx, oci2_rx) = watch::channel(ControllerStatus::idle(MachineId::new("oci2")));
    let st = Arc::new(AppState::new(StatusBoard::new(vec![oci1_rx, oci2_rx])));

    oci1_tx.send_modify(|s| {
        s.state = ControllerState::Monitoring;
        s.last_reject_count = Some(43);
        s.batches_committed = 2;
        s.batches_failed = 1;
        s.records_committed = 4;
        s.last_commit_epoch_ms = Some(1_700_000_000_000);
        s.last_error = Some("persistence failed: relation does not exist".into());
    });

    let (status, body) = get(routes::build_router(st), "/v1/machines").await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    let machines = json.as_array().expect("array body");
    assert_eq!(machines.len(), 2);

    let oci1 = &machines[0];
    assert_eq!(oci1["machine"], "oci1");
    assert_eq!(oci1["state"], "monitoring");
    assert_eq!(oci1["last_reject_count"], 43);
    assert_eq!(oci1["batches_committed"], 2);
    assert_eq!(oci1["batches_failed"], 1);
    assert_eq!(oci1["records_committed"], 4);
    assert_eq!(oci1["last_commit_epoch_ms"], 1_700_000_000_000i64);
    assert!(oci1.get("last_error").is_none());

    let oci2 = &machines[1];
    assert_eq!(oci2["machine"], "oci2");
    assert_eq!(oci2["state"], "idle");
    assert!(oci2["last_reject_count"].is_null());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let router = routes::build_router(Arc::new(AppState::default()));
    let (status, _) = get(router, "/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
