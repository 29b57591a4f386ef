// crates/sensor-gate-broker/src/lib.rs
// ============================================================================
// Module: Sensor Gate Broker Library
// Description: Broker sessions, topology declaration, and serialized publishing.
// Purpose: Own the broker connection lifecycle behind the core Publisher seam.
// Dependencies: sensor-gate-core, lapin, tokio, tracing
// ============================================================================

//! ## Overview
//! `sensor-gate-broker` owns the single broker session used by the gateway.
//! [`BrokerConnector`] opens sessions, [`Topology`] declares the exchange,
//! queue, and binding, [`SerializedPublisher`] guards the shared channel, and
//! [`BrokerSupervisor`] restores the session after connection loss.
//! Invariants:
//! - At most one publish is in flight on a channel at any time.
//! - Topology is declared on every new session before publishes resume.
//! - Connection loss suspends publishing until a new session is installed.
//!
//! Backends: [`AmqpConnector`] (lapin) and [`InMemoryConnector`] for tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod amqp;
pub mod channel;
pub mod memory;
pub mod publisher;
pub mod supervisor;
pub mod topology;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use amqp::AmqpConnector;
pub use channel::BrokerChannel;
pub use channel::BrokerConnector;
pub use channel::BrokerError;
pub use channel::BrokerSession;
pub use memory::InMemoryBroker;
pub use memory::InMemoryConnector;
pub use memory::PublishedMessage;
pub use publisher::SerializedPublisher;
pub use supervisor::BrokerSupervisor;
pub use supervisor::ReconnectPolicy;
pub use topology::BindingSpec;
pub use topology::ExchangeKind;
pub use topology::ExchangeSpec;
pub use topology::QueueSpec;
pub use topology::Topology;
