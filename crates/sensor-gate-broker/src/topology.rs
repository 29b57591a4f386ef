// crates/sensor-gate-broker/src/topology.rs
// ============================================================================
// Module: Broker Topology
// Description: Exchange, queue, and binding declarations for telemetry.
// Purpose: Declare the durable sensor topology idempotently on each session.
// Dependencies: tracing, crate::channel
// ============================================================================

//! ## Overview
//! The telemetry topology is one durable topic exchange, one durable queue,
//! and a single catch-all binding between them. Declarations are idempotent:
//! running them on every startup or reconnect leaves exactly one of each.
//! A pre-existing entity with different properties is a fatal mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::info;

use crate::channel::BrokerChannel;
use crate::channel::BrokerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default exchange and queue name.
pub const DEFAULT_TOPOLOGY_NAME: &str = "sensors";
/// Binding pattern matching every routing key.
pub const CATCH_ALL_PATTERN: &str = "#";

// ============================================================================
// SECTION: Specs
// ============================================================================

/// Exchange routing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Pattern routing on dotted keys.
    Topic,
    /// Exact routing-key match.
    Direct,
    /// Every bound queue.
    Fanout,
}

/// Exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    /// Exchange name.
    pub name: String,
    /// Routing behavior.
    pub kind: ExchangeKind,
    /// Survives broker restart.
    pub durable: bool,
    /// Deleted when the last binding is removed.
    pub auto_delete: bool,
}

/// Queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Survives broker restart.
    pub durable: bool,
    /// Restricted to the declaring connection.
    pub exclusive: bool,
    /// Deleted when the last consumer disconnects.
    pub auto_delete: bool,
}

/// Queue-to-exchange binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    /// Bound queue.
    pub queue: String,
    /// Source exchange.
    pub exchange: String,
    /// Routing pattern.
    pub pattern: String,
}

// ============================================================================
// SECTION: Topology
// ============================================================================

/// Full telemetry topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Topic exchange receiving telemetry.
    pub exchange: ExchangeSpec,
    /// Durable queue collecting telemetry.
    pub queue: QueueSpec,
    /// Binding between them.
    pub binding: BindingSpec,
}

impl Topology {
    /// Builds a durable topic topology with the given names.
    #[must_use]
    pub fn new(exchange: &str, queue: &str, pattern: &str) -> Self {
        Self {
            exchange: ExchangeSpec {
                name: exchange.to_string(),
                kind: ExchangeKind::Topic,
                durable: true,
                auto_delete: false,
            },
            queue: QueueSpec {
                name: queue.to_string(),
                durable: true,
                exclusive: false,
                auto_delete: false,
            },
            binding: BindingSpec {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                pattern: pattern.to_string(),
            },
        }
    }

    /// Default `sensors` topology bound with `#`.
    #[must_use]
    pub fn sensors() -> Self {
        Self::new(DEFAULT_TOPOLOGY_NAME, DEFAULT_TOPOLOGY_NAME, CATCH_ALL_PATTERN)
    }

    /// Returns the exchange that receives publishes.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.exchange.name
    }

    /// Declares exchange, queue, and binding in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`BrokerError`] reported by the channel.
    pub async fn declare(&self, channel: &dyn BrokerChannel) -> Result<(), BrokerError> {
        channel.declare_exchange(&self.exchange).await?;
        channel.declare_queue(&self.queue).await?;
        channel.bind_queue(&self.binding).await?;
        info!(
            exchange = %self.exchange.name,
            queue = %self.queue.name,
            pattern = %self.binding.pattern,
            "broker topology declared"
        );
        Ok(())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::sensors()
    }
}
