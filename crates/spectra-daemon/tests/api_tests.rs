// SPDX-License-Identifier: MIT OR Apache-2.0
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use spectra_daemon::{build_app, in_memory_state, AppState};
use tower::ServiceExt;

fn test_state() -> AppState {
    in_memory_state(&spectra_config::AdapterConfig::default())
}

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Build a signed ingest envelope body around `scan_data`.
fn signed_envelope(key: &SigningKey, scan_data: &Value) -> Vec<u8> {
    let data = serde_json::to_vec(scan_data).unwrap();
    let timestamp = Utc::now().timestamp();
    let mut message = timestamp.to_string().into_bytes();
    message.extend_from_slice(&data);
    let signature = key.sign(&message);

    serde_json::to_vec(&json!({
        "data": data,
        "public_key": base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes()),
        "signature": base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
        "timestamp": timestamp,
    }))
    .unwrap()
}

fn empty_scan() -> Value {
    json!({ "hosts": [] })
}

async fn json_body(resp: axum::response::Response) -> Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = build_app(test_state());

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn ingest_accepts_a_validly_signed_envelope() {
    let app = build_app(test_state());
    let key = signing_key(1);
    let body = signed_envelope(&key, &empty_scan());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = json_body(resp).await;
    assert_eq!(json["status"], "accepted");
    assert!(json["job_id"].is_string());
}

#[tokio::test]
async fn ingest_rejects_a_tampered_signature() {
    let app = build_app(test_state());
    let key = signing_key(1);
    let mut body: Value = serde_json::from_slice(&signed_envelope(&key, &empty_scan())).unwrap();
    body["signature"] = json!("tampered");

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(resp).await;
    // envelope failure reasons collapse to one public code regardless of cause.
    assert_eq!(json["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn ingest_rejects_a_stale_timestamp() {
    let app = build_app(test_state());
    let key = signing_key(1);
    let data = serde_json::to_vec(&empty_scan()).unwrap();
    let stale_timestamp = Utc::now().timestamp() - 3600;
    let mut message = stale_timestamp.to_string().into_bytes();
    message.extend_from_slice(&data);
    let signature = key.sign(&message);
    let body = serde_json::to_vec(&json!({
        "data": data,
        "public_key": base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes()),
        "signature": base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
        "timestamp": stale_timestamp,
    }))
    .unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(resp).await;
    assert_eq!(json["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn ingest_rejects_malformed_envelope_json() {
    let app = build_app(test_state());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_rejects_oversized_body() {
    let app = build_app(test_state());
    let oversized = vec![b'a'; spectra_daemon::MAX_INGEST_BODY_BYTES + 1];

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(oversized))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_admission_is_rate_limited_past_capacity() {
    let mut state = test_state();
    state.ingest_limiter = spectra_ratelimit::RateLimiter::new(1, std::time::Duration::from_secs(60));
    let app = build_app(state);
    let key = signing_key(2);

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(signed_envelope(&key, &empty_scan())))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(signed_envelope(&key, &empty_scan())))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn list_jobs_reflects_ingested_job() {
    let app = build_app(test_state());
    let key = signing_key(3);

    let ingest_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/mesh/ingest")
                .header("content-type", "application/json")
                .body(Body::from(signed_envelope(&key, &empty_scan())))
                .unwrap(),
        )
        .await
        .unwrap();
    let job_id = json_body(ingest_resp).await["job_id"].as_str().unwrap().to_string();

    let list_resp = app
        .oneshot(
            Request::builder()
                .uri("/v1/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list_resp.status(), StatusCode::OK);
    let json = json_body(list_resp).await;
    let jobs = json["jobs"].as_array().unwrap();
    assert!(jobs.iter().any(|j| j["id"] == job_id));
}

#[tokio::test]
async fn get_job_returns_not_found_for_unknown_id() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}", uuid::Uuid::nil()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_host_returns_not_found_for_unknown_ip() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/v1/query/host/203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_host_rejects_depth_above_five() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/v1/query/host/203.0.113.9?depth=6")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_graph_by_vuln_with_no_matches_returns_empty_page() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/query/graph")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "query_type": "by_vuln",
                        "cve": "CVE-2024-9999",
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn query_graph_rejects_missing_required_field() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/query/graph")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "query_type": "by_asn" })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_similar_without_embedding_adapter_is_unavailable() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/query/similar")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "query": "nginx rce" })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn query_similar_rejects_empty_query() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/query/similar")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "query": "" })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn every_response_carries_a_request_id_header() {
    let app = build_app(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
}
