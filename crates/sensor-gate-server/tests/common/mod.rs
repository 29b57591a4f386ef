// crates/sensor-gate-server/tests/common/mod.rs
// =============================================================================
// Module: Server Test Helpers
// Description: Router fixtures, publisher doubles, and request helpers.
// Purpose: Drive the ingestion routes in-process without a network listener.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Fixtures use fixed, valid inputs."
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use sensor_gate_broker::InMemoryBroker;
use sensor_gate_broker::SerializedPublisher;
use sensor_gate_broker::Topology;
use sensor_gate_core::Capability;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::PublishError;
use sensor_gate_core::Publisher;
use sensor_gate_core::TenantId;
use sensor_gate_server::Account;
use sensor_gate_server::GatewaySettings;
use sensor_gate_server::GatewayState;
use sensor_gate_server::IdentityProvider;
use sensor_gate_server::StaticIdentityProvider;
use sensor_gate_server::build_router;
use tower::ServiceExt;

pub const DEVICE: &str = "cd0a6b8a-a32f-4cec-bd4d-38b24ac793e0";
pub const WRITER_TOKEN: &str = "t1-writer";
pub const READER_TOKEN: &str = "t1-reader";

/// Account for `tenant` holding `capabilities`.
pub fn account(tenant: &str, capabilities: &[&str]) -> Account {
    Account {
        tenant_id: TenantId::parse(tenant).unwrap(),
        capabilities: capabilities.iter().map(|label| Capability::new(*label)).collect::<BTreeSet<_>>(),
    }
}

/// Static provider with a writer and a read-only token for `T1`.
pub fn identity() -> Arc<dyn IdentityProvider> {
    Arc::new(
        StaticIdentityProvider::new()
            .with_token(WRITER_TOKEN, account("T1", &[Capability::SENSOR_WRITE]))
            .with_token(READER_TOKEN, account("T1", &["sensor:read"])),
    )
}

/// Router publishing through `publisher`.
pub fn router_with(publisher: Arc<dyn Publisher>, settings: GatewaySettings) -> Router {
    build_router(Arc::new(GatewayState::new(publisher, settings)), identity())
}

/// In-memory broker with a declared topology and a live publisher.
pub async fn broker_app() -> (Router, InMemoryBroker, Arc<SerializedPublisher>) {
    let broker = InMemoryBroker::new();
    let channel = Arc::new(broker.channel());
    Topology::sensors().declare(channel.as_ref()).await.unwrap();
    let publisher = Arc::new(SerializedPublisher::with_channel("sensors", channel));
    let router = router_with(publisher.clone(), GatewaySettings::default());
    (router, broker, publisher)
}

/// Builds an authenticated JSON `POST /sensors` request.
pub fn post_sensor(token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder =
        Request::builder().method("POST").uri("/sensors").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(body.into()).unwrap()
}

/// Sends a request and collects the response.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

/// Parses a `{"message": ...}` error body.
pub fn message_of(body: &[u8]) -> String {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    value["message"].as_str().unwrap_or_default().to_string()
}

/// Publisher double recording every call.
#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<OutboundMessage>>,
    pub failure: Option<PublishError>,
    pub delay: Option<Duration>,
}

impl RecordingPublisher {
    pub fn failing(error: PublishError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        self.messages.lock().unwrap().push(message.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
