//! Broker supervisor tests for sensor-gate-broker.
// crates/sensor-gate-broker/tests/supervisor.rs
// =============================================================================
// Module: Supervisor Tests
// Description: Startup, reconnect, and exhaustion behavior.
// Purpose: Ensure connection loss suspends then restores publishing.
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

use std::sync::Arc;
use std::time::Duration;

use sensor_gate_broker::BrokerError;
use sensor_gate_broker::BrokerChannel;
use sensor_gate_broker::BrokerSupervisor;
use sensor_gate_broker::ExchangeKind;
use sensor_gate_broker::ExchangeSpec;
use sensor_gate_broker::InMemoryBroker;
use sensor_gate_broker::InMemoryConnector;
use sensor_gate_broker::ReconnectPolicy;
use sensor_gate_broker::SerializedPublisher;
use sensor_gate_broker::Topology;
use sensor_gate_core::Publisher;

mod common;

fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
    }
}

async fn started(
    max_attempts: u32,
) -> (InMemoryBroker, InMemoryConnector, BrokerSupervisor, Arc<SerializedPublisher>) {
    let broker = InMemoryBroker::new();
    let connector = InMemoryConnector::new(broker.clone());
    let mut supervisor =
        BrokerSupervisor::new(Arc::new(connector.clone()), Topology::sensors(), policy(max_attempts));
    supervisor.start().await.unwrap();
    let publisher = supervisor.publisher();
    (broker, connector, supervisor, publisher)
}

async fn wait_ready(publisher: &SerializedPublisher) {
    for _ in 0 .. 200 {
        if publisher.is_ready().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("publisher never became ready");
}

#[tokio::test]
async fn start_declares_topology_and_enables_publishing() {
    let (broker, _connector, _supervisor, publisher) = started(3).await;
    publisher.publish(&common::message("T1", "a")).await.unwrap();
    assert_eq!(broker.queue_messages("sensors").len(), 1);
}

#[tokio::test]
async fn start_fails_when_broker_unreachable() {
    let broker = InMemoryBroker::new();
    let connector = InMemoryConnector::new(broker);
    connector.fail_next_connects(1);
    let mut supervisor =
        BrokerSupervisor::new(Arc::new(connector), Topology::sensors(), policy(3));
    assert!(matches!(supervisor.start().await, Err(BrokerError::Connection(_))));
}

#[tokio::test(start_paused = true)]
async fn connection_loss_reconnects_and_redeclares() {
    let (broker, connector, supervisor, publisher) = started(5).await;
    let task = tokio::spawn(supervisor.run());

    connector.fail_next_connects(2);
    connector.drop_connections("broker restarted");
    tokio::task::yield_now().await;
    wait_ready(&publisher).await;

    publisher.publish(&common::message("T1", "after")).await.unwrap();
    assert_eq!(connector.attempts(), 4);
    assert_eq!(broker.exchanges().len(), 1);
    assert_eq!(broker.bindings().len(), 1);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_is_fatal() {
    let (_broker, connector, supervisor, _publisher) = started(2).await;
    connector.fail_next_connects(10);
    connector.drop_connections("broker gone");
    let result = supervisor.run().await;
    match result {
        Err(BrokerError::ReconnectExhausted {
            attempts,
            ..
        }) => assert_eq!(attempts, 2),
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn zero_budget_exits_on_first_loss() {
    let (_broker, connector, supervisor, publisher) = started(0).await;
    connector.drop_connections("broker gone");
    let result = supervisor.run().await;
    assert!(matches!(result, Err(BrokerError::ReconnectExhausted { attempts: 0, .. })));
    assert!(!publisher.is_ready().await);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_close_of_lost_channel_still_reconnects() {
    let (_broker, connector, supervisor, publisher) = started(3).await;
    let task = tokio::spawn(supervisor.run());

    connector.drop_connections("broker restarted");
    tokio::task::yield_now().await;
    wait_ready(&publisher).await;

    publisher.publish(&common::message("T1", "after")).await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test]
async fn declaration_conflict_fails_start_and_leaves_publisher_suspended() {
    let broker = InMemoryBroker::new();
    broker
        .channel()
        .declare_exchange(&ExchangeSpec {
            name: "sensors".to_string(),
            kind: ExchangeKind::Fanout,
            durable: true,
            auto_delete: false,
        })
        .await
        .unwrap();
    let connector = InMemoryConnector::new(broker);
    let mut supervisor =
        BrokerSupervisor::new(Arc::new(connector.clone()), Topology::sensors(), policy(3));
    let result = supervisor.start().await;
    assert!(matches!(result, Err(BrokerError::PreconditionFailed(_))));
    assert!(!supervisor.publisher().is_ready().await);
    assert_eq!(connector.attempts(), 1);
}
