// crates/sensor-gate-broker/src/memory.rs
// ============================================================================
// Module: In-Memory Broker
// Description: Process-local broker with topic routing and fault injection.
// Purpose: Substitute the production broker in tests and local runs.
// Dependencies: async-trait, sensor-gate-core, tokio, crate::channel
// ============================================================================

//! ## Overview
//! [`InMemoryBroker`] keeps exchanges, queues, bindings, and every accepted
//! message in shared state. Declarations follow broker semantics: identical
//! redeclaration is a no-op and a conflicting one fails with
//! [`BrokerError::PreconditionFailed`]. Messages are routed to bound queues
//! with [`sensor_gate_core::topic_matches`].
//! [`InMemoryConnector`] hands out sessions on the shared broker and can
//! fail connects or drop live sessions on demand.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::topic_matches;
use tokio::sync::oneshot;

use crate::channel::BrokerChannel;
use crate::channel::BrokerConnector;
use crate::channel::BrokerError;
use crate::channel::BrokerSession;
use crate::topology::BindingSpec;
use crate::topology::ExchangeKind;
use crate::topology::ExchangeSpec;
use crate::topology::QueueSpec;

// ============================================================================
// SECTION: Broker State
// ============================================================================

/// Message accepted by an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Receiving exchange.
    pub exchange: String,
    /// Message as published.
    pub message: OutboundMessage,
}

/// Declared queue with its backlog.
#[derive(Debug)]
struct QueueRecord {
    /// Declaration.
    spec: QueueSpec,
    /// Routed messages in arrival order.
    messages: Vec<OutboundMessage>,
}

/// Shared broker state.
#[derive(Debug, Default)]
struct BrokerState {
    /// Exchanges by name.
    exchanges: BTreeMap<String, ExchangeSpec>,
    /// Queues by name.
    queues: BTreeMap<String, QueueRecord>,
    /// Distinct bindings.
    bindings: Vec<BindingSpec>,
    /// Every accepted publish.
    published: Vec<PublishedMessage>,
    /// Publishes to reject before accepting again.
    reject_remaining: usize,
}

/// Process-local broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    /// Shared state.
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new channel on this broker.
    #[must_use]
    pub fn channel(&self) -> InMemoryChannel {
        InMemoryChannel {
            broker: self.clone(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Rejects the next `count` publishes with [`BrokerError::Rejected`].
    pub fn reject_next_publishes(&self, count: usize) {
        self.lock().reject_remaining = count;
    }

    /// Returns every accepted publish in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Returns messages routed to a queue.
    #[must_use]
    pub fn queue_messages(&self, queue: &str) -> Vec<OutboundMessage> {
        self.lock().queues.get(queue).map(|record| record.messages.clone()).unwrap_or_default()
    }

    /// Returns declared exchanges.
    #[must_use]
    pub fn exchanges(&self) -> Vec<ExchangeSpec> {
        self.lock().exchanges.values().cloned().collect()
    }

    /// Returns declared queues.
    #[must_use]
    pub fn queues(&self) -> Vec<QueueSpec> {
        self.lock().queues.values().map(|record| record.spec.clone()).collect()
    }

    /// Returns declared bindings.
    #[must_use]
    pub fn bindings(&self) -> Vec<BindingSpec> {
        self.lock().bindings.clone()
    }

    /// Locks state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Channel
// ============================================================================

/// Channel on an [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct InMemoryChannel {
    /// Owning broker.
    broker: InMemoryBroker,
    /// Cleared on close or dropped connection.
    open: Arc<AtomicBool>,
}

impl InMemoryChannel {
    /// Fails when the channel has been closed.
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed("channel is closed".to_string()))
        }
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        match state.exchanges.get(&spec.name) {
            Some(existing) if existing == spec => Ok(()),
            Some(_) => Err(BrokerError::PreconditionFailed(format!(
                "exchange {} redeclared with different properties",
                spec.name
            ))),
            None => {
                state.exchanges.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        match state.queues.get(&spec.name) {
            Some(existing) if existing.spec == *spec => Ok(()),
            Some(_) => Err(BrokerError::PreconditionFailed(format!(
                "queue {} redeclared with different properties",
                spec.name
            ))),
            None => {
                state.queues.insert(
                    spec.name.clone(),
                    QueueRecord {
                        spec: spec.clone(),
                        messages: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, spec: &BindingSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if !state.exchanges.contains_key(&spec.exchange) {
            return Err(BrokerError::Topology(format!("no exchange {}", spec.exchange)));
        }
        if !state.queues.contains_key(&spec.queue) {
            return Err(BrokerError::Topology(format!("no queue {}", spec.queue)));
        }
        if !state.bindings.contains(spec) {
            state.bindings.push(spec.clone());
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        let Some(kind) = state.exchanges.get(exchange).map(|spec| spec.kind) else {
            return Err(BrokerError::Publish(format!("no exchange {exchange}")));
        };
        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            return Err(BrokerError::Rejected("broker nacked message".to_string()));
        }
        let key = message.routing_key.as_str();
        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|binding| binding.exchange == exchange)
            .filter(|binding| match kind {
                ExchangeKind::Topic => topic_matches(&binding.pattern, key),
                ExchangeKind::Direct => binding.pattern == key,
                ExchangeKind::Fanout => true,
            })
            .map(|binding| binding.queue.clone())
            .collect();
        for queue in targets {
            if let Some(record) = state.queues.get_mut(&queue) {
                record.messages.push(message.clone());
            }
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.open.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed("channel already closed".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Live session handles kept for fault injection.
struct LiveSession {
    /// Channel open flag.
    open: Arc<AtomicBool>,
    /// Close notification sender.
    closed: oneshot::Sender<String>,
}

/// Connector fault-injection state.
#[derive(Default)]
struct ConnectorState {
    /// Connects to fail before succeeding again.
    fail_remaining: usize,
    /// Connect attempts, successful or not.
    attempts: usize,
    /// Sessions not yet dropped.
    live: Vec<LiveSession>,
}

/// Connector opening sessions on an [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemoryConnector {
    /// Target broker.
    broker: InMemoryBroker,
    /// Fault-injection state.
    state: Arc<Mutex<ConnectorState>>,
}

impl InMemoryConnector {
    /// Creates a connector for the broker.
    #[must_use]
    pub fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker,
            state: Arc::new(Mutex::new(ConnectorState::default())),
        }
    }

    /// Fails the next `count` connects with [`BrokerError::Connection`].
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().fail_remaining = count;
    }

    /// Returns connect attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Simulates connection loss on every live session.
    pub fn drop_connections(&self, reason: &str) {
        let live = std::mem::take(&mut self.lock().live);
        for session in live {
            session.open.store(false, Ordering::SeqCst);
            let _ = session.closed.send(reason.to_string());
        }
    }

    /// Locks state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InMemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnector").field("broker", &self.broker).finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryConnector {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(BrokerError::Connection("connection refused".to_string()));
        }
        let channel = self.broker.channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        state.live.push(LiveSession {
            open: Arc::clone(&channel.open),
            closed: closed_tx,
        });
        Ok(BrokerSession {
            channel: Arc::new(channel),
            closed: closed_rx,
        })
    }
}
