// crates/sensor-gate-broker/src/publisher.rs
// ============================================================================
// Module: Serialized Publisher
// Description: Mutex-guarded access to the shared publishing channel.
// Purpose: Make one broker channel safe for many concurrent request tasks.
// Dependencies: async-trait, sensor-gate-core, tokio, crate::channel
// ============================================================================

//! ## Overview
//! [`SerializedPublisher`] implements [`Publisher`] over whichever channel
//! the supervisor has installed. The channel slot is guarded by a
//! `tokio::sync::Mutex` held for the full publish round trip, so publishes
//! never interleave on the wire. An empty slot means the session is being
//! restored and publishes fail fast with [`PublishError::Unavailable`].
//! Invariants:
//! - At most one publish is in flight per channel.
//! - A publish that finds the channel closed signals the supervisor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::PublishError;
use sensor_gate_core::Publisher;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::channel::BrokerChannel;
use crate::channel::BrokerError;

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Publisher serializing access to a single broker channel.
pub struct SerializedPublisher {
    /// Exchange receiving every publish.
    exchange: String,
    /// Installed channel; `None` while suspended.
    channel: Mutex<Option<Arc<dyn BrokerChannel>>>,
    /// Signalled when a publish observes a closed channel.
    lost: Notify,
}

impl SerializedPublisher {
    /// Creates a suspended publisher for the exchange.
    #[must_use]
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            channel: Mutex::new(None),
            lost: Notify::new(),
        }
    }

    /// Creates a publisher with a channel already installed.
    #[must_use]
    pub fn with_channel(exchange: impl Into<String>, channel: Arc<dyn BrokerChannel>) -> Self {
        Self {
            exchange: exchange.into(),
            channel: Mutex::new(Some(channel)),
            lost: Notify::new(),
        }
    }

    /// Installs a channel, resuming publishes.
    pub async fn install(&self, channel: Arc<dyn BrokerChannel>) {
        *self.channel.lock().await = Some(channel);
    }

    /// Removes the channel, suspending publishes; returns the old channel.
    pub async fn suspend(&self) -> Option<Arc<dyn BrokerChannel>> {
        self.channel.lock().await.take()
    }

    /// Returns true when an open channel is installed.
    pub async fn is_ready(&self) -> bool {
        self.channel.lock().await.as_ref().is_some_and(|channel| channel.is_open())
    }

    /// Resolves when a publish observed a closed channel.
    pub async fn channel_lost(&self) {
        self.lost.notified().await;
    }

    /// Suspends and closes the installed channel.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the close handshake fails.
    pub async fn close(&self) -> Result<(), BrokerError> {
        match self.suspend().await {
            Some(channel) => channel.close().await,
            None => Ok(()),
        }
    }

    /// Returns the target exchange.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl std::fmt::Debug for SerializedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedPublisher")
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Publisher for SerializedPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        let slot = self.channel.lock().await;
        let Some(channel) = slot.as_ref() else {
            return Err(PublishError::Unavailable("broker session is reconnecting".to_string()));
        };
        if !channel.is_open() {
            self.lost.notify_one();
            return Err(PublishError::Unavailable("broker channel is closed".to_string()));
        }
        match channel.publish(&self.exchange, message).await {
            Ok(()) => {
                debug!(
                    routing_key = %message.routing_key,
                    correlation_id = %message.correlation_id,
                    "message confirmed"
                );
                Ok(())
            }
            Err(err @ BrokerError::ChannelClosed(_)) => {
                self.lost.notify_one();
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
