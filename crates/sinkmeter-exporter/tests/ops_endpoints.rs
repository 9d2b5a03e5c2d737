//! Ops router served in-process.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use sinkmeter_core::{BlockEvent, BlockUndoSignal};
use sinkmeter_exporter::{app_state::AppState, config, router};

fn state() -> AppState {
    let cfg = config::load_from_str(
        r#"
version: 1
metrics:
  trace_id_series_limit: 4
manifest:
  manifest: "substreams.spkg"
  substreams_endpoint: "eth.example:443"
  module_hash: "0xabc"
  output_module: "out"
  start_block_num: 100
  stop_block_num: 200
  production_mode: true
"#,
    )
    .unwrap();
    AppState::new(cfg).unwrap()
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, Option<String>, String) {
    let resp = router::build_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn healthz_is_always_ok() {
    let (status, _, body) = get(&state(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn readyz_waits_for_manifest() {
    let state = state();
    let (status, _, _) = get(&state, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.bridge().handle_manifest(&state.cfg().manifest.descriptor());
    let (status, _, body) = get(&state, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ready");
}

#[tokio::test]
async fn metrics_exposes_registry_text() {
    let state = state();
    state.bridge().handle_manifest(&state.cfg().manifest.descriptor());
    state.bridge().dispatch(&BlockEvent::Undo(BlockUndoSignal::default()));

    let (status, content_type, body) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4; charset=utf-8"));
    assert!(body.contains("# TYPE substreams_sink_undo_message counter\n"));
    assert!(body.contains("substreams_sink_undo_message 1\n"));
    assert!(body.contains("# TYPE head_block_time_drift gauge\n"));
    assert!(body.contains("productionMode=\"true\"} 1\n"));
}
