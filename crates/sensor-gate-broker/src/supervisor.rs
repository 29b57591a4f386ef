// crates/sensor-gate-broker/src/supervisor.rs
// ============================================================================
// Module: Broker Supervisor
// Description: Session startup and reconnect-with-backoff after loss.
// Purpose: Keep a declared topology and live channel behind the publisher.
// Dependencies: tokio, tracing, crate::{channel, publisher, topology}
// ============================================================================

//! ## Overview
//! [`BrokerSupervisor::start`] opens the first session and declares the
//! topology; any failure there is fatal to the caller. [`BrokerSupervisor::run`]
//! then waits for connection loss, suspends the publisher, and reconnects
//! with exponential backoff, redeclaring the topology each time. It returns
//! [`BrokerError::ReconnectExhausted`] once the attempt budget is spent.
//! A budget of zero exits on the first loss.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::channel::BrokerConnector;
use crate::channel::BrokerError;
use crate::publisher::SerializedPublisher;
use crate::topology::Topology;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts per outage; zero disables reconnecting.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// Returns the delay before the 1-based `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Owns the broker session lifecycle.
pub struct BrokerSupervisor {
    /// Session factory.
    connector: Arc<dyn BrokerConnector>,
    /// Topology declared on each session.
    topology: Topology,
    /// Publisher receiving each new channel.
    publisher: Arc<SerializedPublisher>,
    /// Reconnect schedule.
    policy: ReconnectPolicy,
    /// Close notification of the current session.
    closed: Option<oneshot::Receiver<String>>,
}

impl BrokerSupervisor {
    /// Creates a supervisor with a suspended publisher.
    #[must_use]
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        topology: Topology,
        policy: ReconnectPolicy,
    ) -> Self {
        let publisher = Arc::new(SerializedPublisher::new(topology.exchange_name()));
        Self {
            connector,
            topology,
            publisher,
            policy,
            closed: None,
        }
    }

    /// Returns the publisher fed by this supervisor.
    #[must_use]
    pub fn publisher(&self) -> Arc<SerializedPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Opens the first session and declares the topology.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when connecting or declaring fails.
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        self.establish().await?;
        info!(exchange = %self.topology.exchange_name(), "broker session established");
        Ok(())
    }

    /// Supervises the session until the reconnect budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ReconnectExhausted`] when every attempt fails.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        loop {
            let reason = self.wait_for_loss().await;
            warn!(reason = %reason, "broker connection lost; suspending publishes");
            if let Some(channel) = self.publisher.suspend().await
                && let Err(err) = channel.close().await
            {
                debug!(error = %err, "closing lost channel failed");
            }
            self.reconnect().await?;
        }
    }

    /// Waits until the current session is lost.
    async fn wait_for_loss(&mut self) -> String {
        let mut closed = self.closed.take();
        let publisher = Arc::clone(&self.publisher);
        loop {
            let close_notice = async {
                match closed.as_mut() {
                    Some(receiver) => receiver
                        .await
                        .unwrap_or_else(|_| "connection close notifier dropped".to_string()),
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                reason = close_notice => return reason,
                () = publisher.channel_lost() => {
                    if !publisher.is_ready().await {
                        return "publish channel closed".to_string();
                    }
                }
            }
        }
    }

    /// Retries the session with backoff.
    async fn reconnect(&mut self) -> Result<(), BrokerError> {
        let mut last_error = "connection lost".to_string();
        for attempt in 1 ..= self.policy.max_attempts {
            let delay = self.policy.delay(attempt);
            info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting to broker"
            );
            tokio::time::sleep(delay).await;
            match self.establish().await {
                Ok(()) => {
                    info!(attempt, "broker session restored");
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, error = %err, "broker reconnect attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        error!(attempts = self.policy.max_attempts, "broker reconnect budget exhausted");
        Err(BrokerError::ReconnectExhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    /// Connects, declares the topology, and installs the channel.
    async fn establish(&mut self) -> Result<(), BrokerError> {
        let session = self.connector.connect().await?;
        if let Err(err) = self.topology.declare(session.channel.as_ref()).await {
            if let Err(close_err) = session.channel.close().await {
                warn!(error = %close_err, "closing channel after failed declaration failed");
            }
            return Err(err);
        }
        self.publisher.install(Arc::clone(&session.channel)).await;
        self.closed = Some(session.closed);
        Ok(())
    }
}

impl std::fmt::Debug for BrokerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSupervisor")
            .field("topology", &self.topology)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
