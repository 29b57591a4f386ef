// crates/sensor-gate-broker/src/amqp.rs
// ============================================================================
// Module: AMQP Backend
// Description: lapin-backed connector and channel.
// Purpose: Speak AMQP 0-9-1 to the production message broker.
// Dependencies: lapin, tokio, tracing, crate::channel
// ============================================================================

//! ## Overview
//! [`AmqpConnector`] opens one connection and one confirm-mode channel per
//! session. Connection errors reported by lapin resolve the session close
//! notification exactly once. Publishes request persistent delivery, carry
//! the correlation id and a `timestamp` header, and wait for the broker
//! confirm; a `Nack` is reported as [`BrokerError::Rejected`].
//!
//! Security posture: the broker URI may embed credentials; it is never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use lapin::BasicProperties;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use lapin::options::BasicPublishOptions;
use lapin::options::ConfirmSelectOptions;
use lapin::options::ExchangeDeclareOptions;
use lapin::options::QueueBindOptions;
use lapin::options::QueueDeclareOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::types::AMQPValue;
use lapin::types::FieldTable;
use lapin::types::LongString;
use lapin::types::ShortString;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::message::TIMESTAMP_HEADER;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::channel::BrokerChannel;
use crate::channel::BrokerConnector;
use crate::channel::BrokerError;
use crate::channel::BrokerSession;
use crate::topology::BindingSpec;
use crate::topology::ExchangeKind;
use crate::topology::ExchangeSpec;
use crate::topology::QueueSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// AMQP delivery mode requesting persistence.
const DELIVERY_MODE_PERSISTENT: u8 = 2;
/// AMQP delivery mode for transient messages.
const DELIVERY_MODE_TRANSIENT: u8 = 1;
/// Reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Opens AMQP sessions against a broker URI.
#[derive(Clone)]
pub struct AmqpConnector {
    /// `amqp://` or `amqps://` URI.
    uri: String,
}

impl AmqpConnector {
    /// Creates a connector for the given URI.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
        }
    }
}

impl std::fmt::Debug for AmqpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;

        let (closed_tx, closed_rx) = oneshot::channel();
        let closed_tx = Mutex::new(Some(closed_tx));
        connection.on_error(move |err| {
            warn!(error = %err, "broker connection error");
            let sender = closed_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(err.to_string());
            }
        });

        let channel = connection
            .create_channel()
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;
        debug!(channel_id = channel.id(), "broker channel opened in confirm mode");

        Ok(BrokerSession {
            channel: Arc::new(AmqpChannel {
                connection,
                channel,
            }),
            closed: closed_rx,
        })
    }
}

// ============================================================================
// SECTION: Channel
// ============================================================================

/// lapin channel together with its owning connection.
pub struct AmqpChannel {
    /// Owning connection; dropped with the channel.
    connection: Connection,
    /// Confirm-mode publishing channel.
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        let options = ExchangeDeclareOptions {
            durable: spec.durable,
            auto_delete: spec.auto_delete,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(&spec.name, exchange_kind(spec.kind), options, FieldTable::default())
            .await
            .map_err(declaration_error)
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            exclusive: spec.exclusive,
            auto_delete: spec.auto_delete,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&spec.name, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(declaration_error)
    }

    async fn bind_queue(&self, spec: &BindingSpec) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                &spec.queue,
                &spec.exchange,
                &spec.pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(declaration_error)
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> Result<(), BrokerError> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                message.routing_key.as_str(),
                BasicPublishOptions::default(),
                &message.body,
                properties(message),
            )
            .await
            .map_err(publish_error)?;
        match confirm.await.map_err(publish_error)? {
            Confirmation::Nack(_) => Err(BrokerError::Rejected("broker nacked message".to_string())),
            _ => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "shutdown")
                .await
                .map_err(|err| BrokerError::ChannelClosed(err.to_string()))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "shutdown")
                .await
                .map_err(|err| BrokerError::ChannelClosed(err.to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds AMQP properties for an outbound message.
fn properties(message: &OutboundMessage) -> BasicProperties {
    let mut headers = FieldTable::default();
    headers.insert(
        ShortString::from(TIMESTAMP_HEADER),
        AMQPValue::LongString(LongString::from(message.timestamp())),
    );
    let delivery_mode =
        if message.persistent { DELIVERY_MODE_PERSISTENT } else { DELIVERY_MODE_TRANSIENT };
    BasicProperties::default()
        .with_content_type(ShortString::from(message.content_type))
        .with_correlation_id(ShortString::from(message.correlation_id.as_str()))
        .with_delivery_mode(delivery_mode)
        .with_headers(headers)
}

/// Maps the local exchange kind onto lapin's.
const fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

/// Classifies a declaration failure.
fn declaration_error(err: lapin::Error) -> BrokerError {
    let message = err.to_string();
    if message.to_ascii_uppercase().contains("PRECONDITION") {
        BrokerError::PreconditionFailed(message)
    } else if is_closed(&err) {
        BrokerError::ChannelClosed(message)
    } else {
        BrokerError::Topology(message)
    }
}

/// Classifies a publish failure.
fn publish_error(err: lapin::Error) -> BrokerError {
    if is_closed(&err) {
        BrokerError::ChannelClosed(err.to_string())
    } else {
        BrokerError::Publish(err.to_string())
    }
}

/// Returns true when the error means the channel or connection is gone.
const fn is_closed(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::IOError(_)
    )
}
