//! Ingestion route tests for sensor-gate-server.
// crates/sensor-gate-server/tests/ingest.rs
// =============================================================================
// Module: Ingestion Route Tests
// Description: End-to-end request handling against in-process brokers.
// Purpose: Ensure status mapping, routing keys, and publish discipline.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use sensor_gate_core::PublishError;
use sensor_gate_server::GatewaySettings;
use sensor_gate_server::GatewayState;
use sensor_gate_server::gateway::handle_sensor;
use serde_json::Value;
use serde_json::json;

mod common;

use common::DEVICE;
use common::READER_TOKEN;
use common::RecordingPublisher;
use common::WRITER_TOKEN;

fn recording_app(publisher: &Arc<RecordingPublisher>) -> axum::Router {
    common::router_with(publisher.clone(), GatewaySettings::default())
}

#[tokio::test]
async fn valid_event_is_published_under_tenant_routing_key() {
    let (router, broker, _publisher) = common::broker_app().await;
    let body = format!(r#"{{"id":"{DEVICE}","status":"running"}}"#);
    let (status, response) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(response.is_empty());
    let published = broker.published();
    assert_eq!(published.len(), 1);
    let message = &published[0].message;
    assert_eq!(published[0].exchange, "sensors");
    assert_eq!(message.routing_key.as_str(), format!("T1.{DEVICE}"));
    assert!(message.persistent);
    assert_eq!(message.content_type, "application/json");
    let sent: Value = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(sent, json!({"id": DEVICE, "status": "running"}));
    assert_eq!(broker.queue_messages("sensors").len(), 1);
}

#[tokio::test]
async fn extra_fields_pass_through_unchanged() {
    let publisher = Arc::new(RecordingPublisher::default());
    let input = json!({
        "id": DEVICE,
        "temperature": 21.5,
        "tags": ["roof", "north"],
        "meta": {"fw": "1.2.3", "battery": null}
    });
    let (status, _) = common::send(
        recording_app(&publisher),
        common::post_sensor(Some(WRITER_TOKEN), input.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = publisher.messages.lock().unwrap();
    let sent: Value = serde_json::from_slice(&messages[0].body).unwrap();
    assert_eq!(sent, input);
}

#[tokio::test]
async fn empty_object_is_rejected_without_publishing() {
    let (router, broker, _publisher) = common::broker_app().await;
    let (status, body) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::message_of(&body), "empty payload");
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn missing_id_never_publishes() {
    let publisher = Arc::new(RecordingPublisher::default());
    for body in [r#"{"status":"running"}"#, r#"{"id":42}"#, r#"{"ID":"x"}"#] {
        let (status, response) =
            common::send(recording_app(&publisher), common::post_sensor(Some(WRITER_TOKEN), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(common::message_of(&response), "missing id field");
    }
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn non_uuid_id_is_rejected() {
    let publisher = Arc::new(RecordingPublisher::default());
    for body in [r#"{"id":"sensor-1"}"#, r#"{"id":""}"#, r#"{"id":"T1.x"}"#] {
        let (status, response) =
            common::send(recording_app(&publisher), common::post_sensor(Some(WRITER_TOKEN), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(common::message_of(&response), "id must be UUID");
    }
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn malformed_json_reports_parse_error() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (status, body) =
        common::send(recording_app(&publisher), common::post_sensor(Some(WRITER_TOKEN), "{\"id\":")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!common::message_of(&body).is_empty());
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn non_json_content_type_is_rejected() {
    let publisher = Arc::new(RecordingPublisher::default());
    let request = Request::builder()
        .method("POST")
        .uri("/sensors")
        .header("authorization", format!("Bearer {WRITER_TOKEN}"))
        .header("content-type", "text/plain")
        .body(Body::from(format!(r#"{{"id":"{DEVICE}"}}"#)))
        .unwrap();
    let (status, body) = common::send(recording_app(&publisher), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::message_of(&body), "content type must be application/json");
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn broker_failure_returns_empty_500() {
    let (router, broker, _publisher) = common::broker_app().await;
    broker.reject_next_publishes(1);
    let body = format!(r#"{{"id":"{DEVICE}"}}"#);
    let (status, response) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.is_empty());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn suspended_publisher_returns_503() {
    let (router, _broker, publisher) = common::broker_app().await;
    publisher.suspend().await;
    let body = format!(r#"{{"id":"{DEVICE}"}}"#);
    let (status, response) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.is_empty());
}

#[tokio::test]
async fn publish_error_variants_map_to_server_errors() {
    for (error, expected) in [
        (PublishError::Failed("nack".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        (PublishError::Timeout, StatusCode::INTERNAL_SERVER_ERROR),
        (PublishError::Unavailable("reconnecting".to_string()), StatusCode::SERVICE_UNAVAILABLE),
    ] {
        let publisher = Arc::new(RecordingPublisher::failing(error));
        let body = format!(r#"{{"id":"{DEVICE}"}}"#);
        let (status, response) =
            common::send(recording_app(&publisher), common::post_sensor(Some(WRITER_TOKEN), body)).await;
        assert_eq!(status, expected);
        assert!(response.is_empty());
        assert_eq!(publisher.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn publish_deadline_expiry_returns_500() {
    let publisher = Arc::new(RecordingPublisher::slow(Duration::from_secs(60)));
    let settings = GatewaySettings {
        max_body_bytes: 1024,
        publish_timeout: Duration::from_millis(100),
    };
    let router = common::router_with(publisher.clone(), settings);
    let body = format!(r#"{{"id":"{DEVICE}"}}"#);
    let (status, response) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.is_empty());
}

#[tokio::test]
async fn oversized_body_returns_413() {
    let publisher = Arc::new(RecordingPublisher::default());
    let settings = GatewaySettings {
        max_body_bytes: 64,
        publish_timeout: Duration::from_secs(1),
    };
    let router = common::router_with(publisher.clone(), settings);
    let body = json!({"id": DEVICE, "blob": "x".repeat(512)}).to_string();
    let (status, _) = common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn interrupted_body_is_a_client_error_not_413() {
    let publisher = Arc::new(RecordingPublisher::default());
    let chunks: Vec<Result<Bytes, io::Error>> = vec![
        Ok(Bytes::from_static(b"{\"id\":")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
    ];
    let request = common::post_sensor(Some(WRITER_TOKEN), Body::from_stream(tokio_stream::iter(chunks)));
    let (status, body) = common::send(recording_app(&publisher), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::message_of(&body), "request body could not be read");
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn handler_without_identity_answers_empty_500() {
    let publisher = Arc::new(RecordingPublisher::default());
    let state = Arc::new(GatewayState::new(publisher.clone(), GatewaySettings::default()));
    let request = Request::builder()
        .method("POST")
        .uri("/sensors")
        .header("content-type", "application/json")
        .body(Body::from(format!(r#"{{"id":"{DEVICE}"}}"#)))
        .unwrap();
    let response = handle_sensor(State(state), request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn unauthenticated_requests_return_401() {
    let publisher = Arc::new(RecordingPublisher::default());
    let body = format!(r#"{{"id":"{DEVICE}"}}"#);
    for token in [None, Some("unknown"), Some(READER_TOKEN)] {
        let (status, response) =
            common::send(recording_app(&publisher), common::post_sensor(token, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {token:?}");
        assert_eq!(common::message_of(&response), "unauthorized");
    }
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn health_requires_no_auth() {
    let publisher = Arc::new(RecordingPublisher::default());
    let request = Request::builder().uri("/sensors/_health").body(Body::empty()).unwrap();
    let (status, _) = common::send(recording_app(&publisher), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_publish_once_each_with_unique_correlation_ids() {
    const REQUESTS: usize = 50;
    let (router, broker, _publisher) = common::broker_app().await;
    let tasks: Vec<_> = (0 .. REQUESTS)
        .map(|index| {
            let router = router.clone();
            tokio::spawn(async move {
                let body = json!({"id": DEVICE, "seq": index}).to_string();
                common::send(router, common::post_sensor(Some(WRITER_TOKEN), body)).await.0
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    let published = broker.published();
    assert_eq!(published.len(), REQUESTS);
    let ids: HashSet<_> = published.iter().map(|entry| entry.message.correlation_id.clone()).collect();
    assert_eq!(ids.len(), REQUESTS);
    let seqs: HashSet<u64> = published
        .iter()
        .map(|entry| {
            let body: Value = serde_json::from_slice(&entry.message.body).unwrap();
            body["seq"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(seqs.len(), REQUESTS);
}
