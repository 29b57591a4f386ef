// crates/sensor-gate-core/src/publisher.rs
// ============================================================================
// Module: Publisher Interface
// Description: Backend-agnostic publish contract for outbound telemetry.
// Purpose: Decouple the ingestion handler from the broker transport.
// Dependencies: async-trait, thiserror, crate::message
// ============================================================================

//! ## Overview
//! [`Publisher`] is the single seam between request handling and the broker.
//! Implementations must be safe to call from many concurrent tasks and must
//! not retry internally; retry policy belongs to the caller.
//! Invariants:
//! - `Ok(())` means the broker accepted the message.
//! - A failed call never leaves a partially published message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use crate::message::OutboundMessage;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Publish failures surfaced to the ingestion handler.
///
/// # Invariants
/// - Variants are stable for response mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Broker reported an error or rejected the message.
    #[error("publish failed: {0}")]
    Failed(String),
    /// No live broker channel (reconnect in progress or shut down).
    #[error("publisher unavailable: {0}")]
    Unavailable(String),
    /// Publish did not complete before the deadline.
    #[error("publish timed out")]
    Timeout,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Hands outbound messages to the message broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a message and waits for the broker to accept it.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the broker does not accept the message.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError>;
}
