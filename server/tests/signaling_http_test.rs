//! HTTP Integration Tests for the REST Signaling Fallback
//!
//! Tests the signaling endpoints:
//! - GET  /api/capabilities
//! - POST /api/rooms/{room_id}/transports
//! - POST /api/rooms/{room_id}/transports/{transport_id}/connect
//! - POST /api/rooms/{room_id}/produce
//! - POST /api/rooms/{room_id}/consume
//! - GET  /api/rooms/{room_id}/producers
//! - POST /api/rooms/{room_id}/leave
//!
//! Every test runs against the full router on the in-process stub engine.
//!
//! Run with: `cargo test --test signaling_http_test -- --nocapture`

mod helpers;

use std::sync::Arc;

use helpers::{body_to_json, TestApp};
use serde_json::json;
use vv_server::engine::StubEngine;

// ============================================================================
// Test Data Helpers
// ============================================================================

fn full_caps() -> serde_json::Value {
    json!({ "codecs": [{ "kind": "audio" }, { "kind": "video" }] })
}

/// Allocate a transport for a user and return its id.
async fn create_transport(app: &TestApp, room: &str, user: &str, direction: &str) -> String {
    let resp = app
        .post_json(
            &format!("/api/rooms/{room}/transports"),
            &json!({ "userId": user, "direction": direction }),
        )
        .await;
    assert_eq!(resp.status(), 200, "Transport creation should succeed");
    let body = body_to_json(resp).await;
    body["id"].as_str().expect("transport id").to_string()
}

/// Connect a transport with dummy DTLS parameters.
async fn connect_transport(app: &TestApp, room: &str, transport_id: &str) {
    let resp = app
        .post_json(
            &format!("/api/rooms/{room}/transports/{transport_id}/connect"),
            &json!({ "dtlsParameters": { "role": "client", "fingerprints": [] } }),
        )
        .await;
    assert_eq!(resp.status(), 200, "Transport connect should succeed");
    let body = body_to_json(resp).await;
    assert_eq!(body["connected"], true);
}

/// Run the full publish sequence for a user and return the producer id.
async fn produce(app: &TestApp, room: &str, user: &str, kind: &str) -> String {
    let transport_id = create_transport(app, room, user, "send").await;
    connect_transport(app, room, &transport_id).await;

    let resp = app
        .post_json(
            &format!("/api/rooms/{room}/produce"),
            &json!({
                "userId": user,
                "transportId": transport_id,
                "kind": kind,
                "rtpParameters": { "codecs": [] },
            }),
        )
        .await;
    assert_eq!(resp.status(), 200, "Produce should succeed");
    let body = body_to_json(resp).await;
    assert_eq!(body["kind"], kind);
    body["id"].as_str().expect("producer id").to_string()
}

// ============================================================================
// GET /health
// ============================================================================

#[tokio::test]
async fn test_health_reports_engine_and_rooms() {
    let app = TestApp::new();

    let resp = app.get("/health").await;
    assert_eq!(resp.status(), 200);

    let json = body_to_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["engine_ready"], true);
    assert_eq!(json["rooms"], 0);
}

#[tokio::test]
async fn test_health_with_engine_still_starting() {
    let app = TestApp::with_engine(Arc::new(StubEngine::offline()));

    let resp = app.get("/health").await;
    assert_eq!(resp.status(), 200, "Health stays 200 while the engine warms up");

    let json = body_to_json(resp).await;
    assert_eq!(json["engine_ready"], false);
}

// ============================================================================
// GET /api/capabilities
// ============================================================================

#[tokio::test]
async fn test_capabilities_lists_router_codecs() {
    let app = TestApp::new();

    let resp = app.get("/api/capabilities").await;
    assert_eq!(resp.status(), 200);

    let json = body_to_json(resp).await;
    let codecs = json["rtpCapabilities"]["codecs"]
        .as_array()
        .expect("codecs array");
    assert!(!codecs.is_empty(), "Router should advertise codecs");
    assert!(
        codecs
            .iter()
            .any(|c| c["mimeType"] == "audio/opus" && c["kind"] == "audio"),
        "Opus should be among the router codecs"
    );
}

#[tokio::test]
async fn test_capabilities_before_engine_ready() {
    let app = TestApp::with_engine(Arc::new(StubEngine::offline()));

    let resp = app.get("/api/capabilities").await;
    assert_eq!(resp.status(), 503);

    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "ENGINE_NOT_READY");
    assert!(json["error"].is_string());
}

// ============================================================================
// POST /api/rooms/{room_id}/transports
// ============================================================================

#[tokio::test]
async fn test_create_transport_returns_descriptor() {
    let app = TestApp::new();

    let resp = app
        .post_json(
            "/api/rooms/standup/transports",
            &json!({ "userId": "ada", "direction": "recv" }),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let json = body_to_json(resp).await;
    assert!(!json["id"].as_str().unwrap().is_empty());
    assert!(json["iceParameters"].is_object());
    assert!(json["iceCandidates"].is_array());
    assert!(json["dtlsParameters"].is_object());

    // First contact creates the room and the session.
    assert_eq!(app.state.rooms.room_count().await, 1);
}

#[tokio::test]
async fn test_create_transport_rejects_malformed_ids() {
    let app = TestApp::new();

    // Invalid user id in the body.
    let resp = app
        .post_json(
            "/api/rooms/standup/transports",
            &json!({ "userId": "no spaces allowed!", "direction": "send" }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // Invalid room id in the path.
    let resp = app
        .post_json(
            "/api/rooms/bad%20room/transports",
            &json!({ "userId": "ada", "direction": "send" }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // Neither attempt should have created a room.
    assert_eq!(app.state.rooms.room_count().await, 0);
}

// ============================================================================
// POST /api/rooms/{room_id}/transports/{transport_id}/connect
// ============================================================================

#[tokio::test]
async fn test_connect_transport_unknown_room() {
    let app = TestApp::new();

    let resp = app
        .post_json(
            "/api/rooms/ghost/transports/t-1/connect",
            &json!({ "dtlsParameters": {} }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "ROOM_NOT_FOUND");
}

#[tokio::test]
async fn test_connect_transport_unknown_transport() {
    let app = TestApp::new();
    create_transport(&app, "standup", "ada", "send").await;

    let resp = app
        .post_json(
            "/api/rooms/standup/transports/t-missing/connect",
            &json!({ "dtlsParameters": {} }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "TRANSPORT_NOT_FOUND");
}

// ============================================================================
// POST /api/rooms/{room_id}/produce
// ============================================================================

#[tokio::test]
async fn test_produce_rejects_foreign_transport() {
    let app = TestApp::new();
    let ada_transport = create_transport(&app, "standup", "ada", "send").await;

    // Bob cannot publish over ada's transport.
    let resp = app
        .post_json(
            "/api/rooms/standup/produce",
            &json!({
                "userId": "bob",
                "transportId": ada_transport,
                "kind": "audio",
                "rtpParameters": {},
            }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "TRANSPORT_NOT_FOUND");
}

// ============================================================================
// GET /api/rooms/{room_id}/producers
// ============================================================================

#[tokio::test]
async fn test_producers_poll_excludes_the_caller() {
    let app = TestApp::new();
    let producer_id = produce(&app, "standup", "ada", "audio").await;

    // Bob sees ada's producer.
    let resp = app.get("/api/rooms/standup/producers?userId=bob").await;
    assert_eq!(resp.status(), 200);
    let json = body_to_json(resp).await;
    let producers = json["producers"].as_array().expect("producers array");
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0]["producerId"], producer_id.as_str());
    assert_eq!(producers[0]["userId"], "ada");
    assert_eq!(producers[0]["kind"], "audio");

    // Ada's own producers are excluded from her poll.
    let resp = app.get("/api/rooms/standup/producers?userId=ada").await;
    let json = body_to_json(resp).await;
    assert!(json["producers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_producers_poll_unknown_room() {
    let app = TestApp::new();

    let resp = app.get("/api/rooms/ghost/producers?userId=ada").await;
    assert_eq!(resp.status(), 404);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "ROOM_NOT_FOUND");
}

// ============================================================================
// POST /api/rooms/{room_id}/consume
// ============================================================================

#[tokio::test]
async fn test_consume_returns_descriptor_and_repeats_are_stable() {
    let app = TestApp::new();
    let producer_id = produce(&app, "standup", "ada", "audio").await;

    let bob_transport = create_transport(&app, "standup", "bob", "recv").await;
    connect_transport(&app, "standup", &bob_transport).await;

    let request = json!({
        "userId": "bob",
        "transportId": bob_transport,
        "producerId": producer_id,
        "rtpCapabilities": full_caps(),
    });

    let resp = app.post_json("/api/rooms/standup/consume", &request).await;
    assert_eq!(resp.status(), 200);
    let first = body_to_json(resp).await;
    assert_eq!(first["producerId"], producer_id.as_str());
    assert_eq!(first["kind"], "audio");
    assert_eq!(first["type"], "simple");
    assert_eq!(first["producerPaused"], false);
    assert!(!first["id"].as_str().unwrap().is_empty());

    // Repeating the subscription returns the same consumer.
    let resp = app.post_json("/api/rooms/standup/consume", &request).await;
    assert_eq!(resp.status(), 200);
    let second = body_to_json(resp).await;
    assert_eq!(second["id"], first["id"]);
}

#[tokio::test]
async fn test_consume_capability_mismatch() {
    let app = TestApp::new();
    let producer_id = produce(&app, "standup", "ada", "video").await;

    let bob_transport = create_transport(&app, "standup", "bob", "recv").await;

    let resp = app
        .post_json(
            "/api/rooms/standup/consume",
            &json!({
                "userId": "bob",
                "transportId": bob_transport,
                "producerId": producer_id,
                "rtpCapabilities": { "codecs": [{ "kind": "audio" }] },
            }),
        )
        .await;
    assert_eq!(resp.status(), 400, "Audio-only capabilities cannot consume video");
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "CANNOT_CONSUME");
}

#[tokio::test]
async fn test_consume_unknown_producer() {
    let app = TestApp::new();
    let bob_transport = create_transport(&app, "standup", "bob", "recv").await;

    let resp = app
        .post_json(
            "/api/rooms/standup/consume",
            &json!({
                "userId": "bob",
                "transportId": bob_transport,
                "producerId": "p-missing",
                "rtpCapabilities": full_caps(),
            }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let json = body_to_json(resp).await;
    assert_eq!(json["code"], "PRODUCER_NOT_FOUND");
}

// ============================================================================
// POST /api/rooms/{room_id}/leave
// ============================================================================

#[tokio::test]
async fn test_leave_removes_producers_from_polls() {
    let app = TestApp::new();
    produce(&app, "standup", "ada", "audio").await;
    create_transport(&app, "standup", "bob", "recv").await;

    let resp = app.get("/api/rooms/standup/producers?userId=bob").await;
    let json = body_to_json(resp).await;
    assert_eq!(json["producers"].as_array().unwrap().len(), 1);

    let resp = app
        .post_json("/api/rooms/standup/leave", &json!({ "userId": "ada" }))
        .await;
    assert_eq!(resp.status(), 200);
    let json = body_to_json(resp).await;
    assert_eq!(json["left"], true);

    // Bob's next poll no longer shows ada's producer.
    let resp = app.get("/api/rooms/standup/producers?userId=bob").await;
    let json = body_to_json(resp).await;
    assert!(json["producers"].as_array().unwrap().is_empty());

    // The room survives: bob is still in it.
    assert_eq!(app.state.rooms.room_count().await, 1);
}

#[tokio::test]
async fn test_leave_lingers_the_emptied_room() {
    let app = TestApp::new();
    create_transport(&app, "standup", "ada", "recv").await;

    let resp = app
        .post_json("/api/rooms/standup/leave", &json!({ "userId": "ada" }))
        .await;
    assert_eq!(resp.status(), 200);

    // Disposal is scheduled, not immediate: the room lingers for rejoins.
    assert_eq!(app.state.rooms.room_count().await, 1);
}

#[tokio::test]
async fn test_leave_unknown_room_is_idempotent() {
    let app = TestApp::new();

    let resp = app
        .post_json("/api/rooms/never-existed/leave", &json!({ "userId": "ghost" }))
        .await;
    assert_eq!(resp.status(), 200);
    let json = body_to_json(resp).await;
    assert_eq!(json["left"], true);
}
