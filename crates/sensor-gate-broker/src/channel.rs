// crates/sensor-gate-broker/src/channel.rs
// ============================================================================
// Module: Broker Channel Interface
// Description: Transport-neutral channel and connector traits.
// Purpose: Let topology, publisher, and supervisor run against any backend.
// Dependencies: async-trait, sensor-gate-core, thiserror, tokio
// ============================================================================

//! ## Overview
//! A [`BrokerConnector`] opens a [`BrokerSession`]: one publishing channel
//! plus a close notification that resolves when the underlying connection
//! is lost. Channels are shared behind `Arc` but are not required to support
//! concurrent publishes; callers serialize access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::PublishError;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::topology::BindingSpec;
use crate::topology::ExchangeSpec;
use crate::topology::QueueSpec;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors emitted by broker backends.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Connection could not be established.
    #[error("broker connection failed: {0}")]
    Connection(String),
    /// Channel or connection is no longer open.
    #[error("broker channel closed: {0}")]
    ChannelClosed(String),
    /// Declaration conflicts with an existing entity.
    #[error("broker precondition failed: {0}")]
    PreconditionFailed(String),
    /// Topology declaration failed for another reason.
    #[error("broker topology declaration failed: {0}")]
    Topology(String),
    /// Broker negatively acknowledged a publish.
    #[error("broker rejected message: {0}")]
    Rejected(String),
    /// Publish failed in transit.
    #[error("broker publish failed: {0}")]
    Publish(String),
    /// Reconnect budget exhausted.
    #[error("broker reconnect failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last observed failure.
        last_error: String,
    },
}

impl From<BrokerError> for PublishError {
    fn from(error: BrokerError) -> Self {
        match error {
            BrokerError::ChannelClosed(reason) | BrokerError::Connection(reason) => {
                Self::Unavailable(reason)
            }
            other => Self::Failed(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// A single broker channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares an exchange; redeclaring an identical exchange is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PreconditionFailed`] when an exchange with the
    /// same name but different properties exists.
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError>;

    /// Declares a queue; redeclaring an identical queue is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PreconditionFailed`] on conflicting properties.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError>;

    /// Binds a queue to an exchange; binding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when either side does not exist.
    async fn bind_queue(&self, spec: &BindingSpec) -> Result<(), BrokerError>;

    /// Publishes a message and waits for the broker confirm.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the message is not confirmed.
    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), BrokerError>;

    /// Returns true while the channel and its connection are usable.
    fn is_open(&self) -> bool;

    /// Closes the channel and its connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the close handshake fails.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connects and opens a publishing channel.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] when the broker is unreachable.
    async fn connect(&self) -> Result<BrokerSession, BrokerError>;
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// A live broker connection with its publishing channel.
pub struct BrokerSession {
    /// Publishing channel.
    pub channel: Arc<dyn BrokerChannel>,
    /// Resolves with a reason when the connection is lost.
    pub closed: oneshot::Receiver<String>,
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession").field("open", &self.channel.is_open()).finish_non_exhaustive()
    }
}
