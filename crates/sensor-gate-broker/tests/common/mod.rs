// crates/sensor-gate-broker/tests/common/mod.rs
// =============================================================================
// Module: Broker Test Helpers
// Description: Shared fixtures for broker integration tests.
// Purpose: Build messages and recording channels without a real broker.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::unwrap_used, reason = "Fixtures use fixed, valid identifiers.")]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use sensor_gate_broker::BindingSpec;
use sensor_gate_broker::BrokerChannel;
use sensor_gate_broker::BrokerError;
use sensor_gate_broker::ExchangeSpec;
use sensor_gate_broker::QueueSpec;
use sensor_gate_core::DeviceId;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::TenantId;
use sensor_gate_core::compose;

pub const DEVICE: &str = "cd0a6b8a-a32f-4cec-bd4d-38b24ac793e0";

/// Builds a telemetry message for a tenant.
pub fn message(tenant: &str, correlation_id: &str) -> OutboundMessage {
    let key = compose(&TenantId::parse(tenant).unwrap(), &DeviceId::parse(DEVICE).unwrap());
    OutboundMessage::json(key, correlation_id.to_string(), br#"{"id":"x"}"#.to_vec())
}

/// Channel that records publishes and detects overlapping calls.
#[derive(Default)]
pub struct OverlapTrackingChannel {
    in_flight: AtomicBool,
    pub overlaps: AtomicUsize,
    pub correlation_ids: Mutex<Vec<String>>,
}

#[async_trait]
impl BrokerChannel for OverlapTrackingChannel {
    async fn declare_exchange(&self, _spec: &ExchangeSpec) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn declare_queue(&self, _spec: &QueueSpec) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn bind_queue(&self, _spec: &BindingSpec) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, _exchange: &str, message: &OutboundMessage) -> Result<(), BrokerError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_micros(50)).await;
        self.correlation_ids.lock().unwrap().push(message.correlation_id.clone());
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Shares a tracking channel as a trait object.
pub fn tracking_channel() -> (Arc<OverlapTrackingChannel>, Arc<dyn BrokerChannel>) {
    let tracking = Arc::new(OverlapTrackingChannel::default());
    let channel: Arc<dyn BrokerChannel> = Arc::clone(&tracking) as Arc<dyn BrokerChannel>;
    (tracking, channel)
}
