// crates/sensor-gate-core/src/lib.rs
// ============================================================================
// Module: Sensor Gate Core Library
// Description: Public API surface for the Sensor Gate ingestion core.
// Purpose: Expose telemetry validation, routing, and publishing contracts.
// Dependencies: crate::{identifiers, event, routing, message, correlation, publisher}
// ============================================================================

//! ## Overview
//! Sensor Gate core holds the pure parts of the ingestion-to-broker bridge:
//! telemetry validation, routing-key composition, outbound message assembly,
//! and the [`Publisher`] seam that broker backends implement. Nothing in this
//! crate performs I/O; transports live in `sensor-gate-broker` and
//! `sensor-gate-server`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod correlation;
pub mod event;
pub mod identifiers;
pub mod message;
pub mod publisher;
pub mod routing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use correlation::CorrelationIdGenerator;
pub use event::TelemetryEvent;
pub use event::ValidationError;
pub use event::validate;
pub use identifiers::Capability;
pub use identifiers::DeviceId;
pub use identifiers::IdentifierError;
pub use identifiers::TenantId;
pub use message::CONTENT_TYPE_JSON;
pub use message::OutboundMessage;
pub use publisher::PublishError;
pub use publisher::Publisher;
pub use routing::ROUTING_KEY_DELIMITER;
pub use routing::RoutingKey;
pub use routing::compose;
pub use routing::topic_matches;
