//! Management API and inbound receiver routes.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::test_service;
use hookrelay::signature::{self, SignaturePolicy};
use hookrelay::{api_router, receiver_router, AppState, Event, InboundState};
use serde_json::{json, Map, Value};
use tower::ServiceExt;

fn app() -> Router {
    api_router(AppState::new(test_service()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Management API
// ============================================================================

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_register_and_fetch_webhook() {
    let app = app();
    let (status, created) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            json!({
                "url": "https://example.test/hook",
                "events": ["job.completed", "job.completed", "job.failed"],
                "secret": "s3cr3t",
                "max_retries": 5
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["has_secret"], json!(true));
    assert!(created.get("secret").is_none());
    assert_eq!(created["events"], json!(["job.completed", "job.failed"]));
    assert_eq!(created["max_retries"], json!(5));
    assert_eq!(created["timeout_ms"], json!(30000));
    assert_eq!(created["retry_delay_ms"], json!(60000));

    let id = created["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(&app, get(&format!("/webhooks/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["url"], json!("https://example.test/hook"));

    let (status, list) = send(&app, get("/webhooks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_invalid_webhook_is_400() {
    let app = app();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            json!({"url": "", "events": ["*"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_webhook"));
    assert_eq!(body["status"], json!(400));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            json!({
                "url": "https://example.test/hook",
                "events": ["*"],
                "headers": {"X-Webhook-Signature": "forged"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            json!({
                "url": "https://example.test/hook",
                "events": ["*"],
                "headers": {"Bad Header": "x\nInjected: y"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&app, get("/webhooks")).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_unknown_webhook_is_404() {
    let app = app();
    let (status, body) = send(&app, get("/webhooks/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("webhook_not_found"));

    let (status, _) = send(&app, get("/webhooks/missing/stats")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/webhooks/missing/deliveries")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = send(&app, get("/deliveries/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete_webhook() {
    let app = app();
    let (_, created) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            json!({"url": "https://example.test/a", "events": ["a"]}),
        ),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = send(
        &app,
        json_request(
            "PUT",
            &format!("/webhooks/{}", id),
            json!({"url": "https://example.test/b", "events": ["b"], "active": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], json!(id));
    assert_eq!(updated["url"], json!("https://example.test/b"));
    assert_eq!(updated["active"], json!(false));
    assert_eq!(updated["created_at"], created["created_at"]);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/webhooks/{}", id))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/webhooks/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_publish_event_creates_deliveries() {
    let app = app();
    let (_, created) = send(
        &app,
        json_request(
            "POST",
            "/webhooks",
            // Nothing listens on port 9; the delivery stays in the retry loop.
            json!({"url": "http://127.0.0.1:9/hook", "events": ["*"], "retry_delay_ms": 60000}),
        ),
    )
    .await;
    let webhook_id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/events",
            json!({"type": "job.completed", "id": "evt_1", "payload": {"job_id": "job_42"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event_id"], json!("evt_1"));
    let deliveries = body["deliveries"].as_array().unwrap();
    assert_eq!(deliveries.len(), 1);

    let delivery_id = deliveries[0].as_str().unwrap();
    let (status, delivery) = send(&app, get(&format!("/deliveries/{}", delivery_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["webhook_id"], json!(webhook_id));
    assert_eq!(delivery["event_id"], json!("evt_1"));
    assert_eq!(delivery["event"]["payload"]["job_id"], json!("job_42"));

    let (_, listed) = send(&app, get(&format!("/webhooks/{}/deliveries", webhook_id))).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, stats) = send(&app, get(&format!("/webhooks/{}/stats", webhook_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["webhook_id"], json!(webhook_id));
    assert_eq!(stats["total"], json!(1));

    let (status, stats) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], json!(1));
    assert_eq!(stats["delivered"], json!(0));
}

#[tokio::test]
async fn test_publish_event_without_subscribers() {
    let (status, body) = send(
        &app(),
        json_request("POST", "/events", json!({"type": "job.completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["deliveries"], json!([]));
}

// ============================================================================
// Inbound receiver
// ============================================================================

fn receiver(secret: Option<&str>, allow_unsigned: bool) -> Router {
    receiver_router(InboundState::new(
        secret.map(str::to_string),
        SignaturePolicy { allow_unsigned },
    ))
}

fn inbound(body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/inbound")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("X-Webhook-Signature", sig);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

fn event_body() -> Vec<u8> {
    serde_json::to_vec(&Event::new("job.completed", Map::new()).with_id("evt_1")).unwrap()
}

#[tokio::test]
async fn test_inbound_accepts_valid_signature() {
    let body = event_body();
    let sig = signature::sign(&body, "s3cr3t");

    let (status, response) = send(&receiver(Some("s3cr3t"), false), inbound(&body, Some(&sig))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["event_id"], json!("evt_1"));
}

#[tokio::test]
async fn test_inbound_rejects_bad_or_missing_signature() {
    let app = receiver(Some("s3cr3t"), false);
    let body = event_body();

    let (status, response) = send(&app, inbound(&body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["success"], json!(false));

    let forged = signature::sign(&body, "wrong");
    let (status, _) = send(&app, inbound(&body, Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut tampered = body.clone();
    tampered[0] = b' ';
    let sig = signature::sign(&body, "s3cr3t");
    let (status, _) = send(&app, inbound(&tampered, Some(&sig))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inbound_rejects_malformed_payload() {
    let body = b"{not json".to_vec();
    let sig = signature::sign(&body, "s3cr3t");

    let (status, response) = send(&receiver(Some("s3cr3t"), false), inbound(&body, Some(&sig))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], json!(false));
}

#[tokio::test]
async fn test_inbound_without_secret_follows_policy() {
    let body = event_body();

    let (status, _) = send(&receiver(None, false), inbound(&body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&receiver(None, true), inbound(&body, None)).await;
    assert_eq!(status, StatusCode::OK);
}
