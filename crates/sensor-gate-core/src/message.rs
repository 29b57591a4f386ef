// crates/sensor-gate-core/src/message.rs
// ============================================================================
// Module: Outbound Messages
// Description: Broker-bound message envelope for validated telemetry.
// Purpose: Carry routing, tracing, and durability metadata to publishers.
// Dependencies: time, crate::routing
// ============================================================================

//! ## Overview
//! An [`OutboundMessage`] is assembled once per accepted request and handed to
//! a [`crate::Publisher`]. The body is the re-serialized telemetry map; the
//! envelope carries the routing key, a fresh correlation id, the creation
//! time, the JSON content type, and a persistent-delivery marker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::routing::RoutingKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type tag for telemetry bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Message header carrying the creation timestamp.
pub const TIMESTAMP_HEADER: &str = "timestamp";

// ============================================================================
// SECTION: Outbound Message
// ============================================================================

/// Message handed to the broker for a single publish attempt.
///
/// # Invariants
/// - `correlation_id` is unique per publish attempt.
/// - `persistent` is always true for telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Topic routing key.
    pub routing_key: RoutingKey,
    /// Per-message tracing token.
    pub correlation_id: String,
    /// Creation time (UTC).
    pub created_at: OffsetDateTime,
    /// Body content type.
    pub content_type: &'static str,
    /// Request persistence past broker restart.
    pub persistent: bool,
    /// Serialized JSON body.
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Builds a persistent JSON message stamped with the current time.
    #[must_use]
    pub fn json(routing_key: RoutingKey, correlation_id: String, body: Vec<u8>) -> Self {
        Self {
            routing_key,
            correlation_id,
            created_at: OffsetDateTime::now_utc(),
            content_type: CONTENT_TYPE_JSON,
            persistent: true,
            body,
        }
    }

    /// Returns the creation time as an RFC 3339 string with sub-second precision.
    #[must_use]
    pub fn timestamp(&self) -> String {
        self.created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.created_at.unix_timestamp_nanos().to_string())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
