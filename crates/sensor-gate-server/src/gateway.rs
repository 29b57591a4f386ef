// crates/sensor-gate-server/src/gateway.rs
// ============================================================================
// Module: Ingestion Gateway Handler
// Description: `POST /sensors` request pipeline.
// Purpose: Turn authenticated telemetry requests into exactly one publish.
// Dependencies: axum, sensor-gate-config, sensor-gate-core, tokio, tracing
// ============================================================================

//! ## Overview
//! The handler runs `validate -> compose -> publish` for requests that passed
//! the auth middleware. It terminates on the first failure:
//! - content type other than JSON, or an invalid payload: `400` with
//!   `{"message": "<reason>"}`;
//! - body above the configured limit: `413`; any other body read failure:
//!   `400`;
//! - publish failure or deadline expiry: `500`, empty body;
//! - broker session unavailable: `503`, empty body.
//!
//! The full parsed JSON map is re-serialized, so fields beyond `id` reach
//! the broker unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::to_bytes;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use http_body_util::LengthLimitError;
use sensor_gate_config::ServerConfig;
use sensor_gate_core::CONTENT_TYPE_JSON;
use sensor_gate_core::CorrelationIdGenerator;
use sensor_gate_core::OutboundMessage;
use sensor_gate_core::PublishError;
use sensor_gate_core::Publisher;
use sensor_gate_core::ValidationError;
use sensor_gate_core::compose;
use sensor_gate_core::validate;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::auth::Account;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Client message for a body that could not be read to completion.
const UNREADABLE_BODY_MESSAGE: &str = "request body could not be read";

// ============================================================================
// SECTION: State
// ============================================================================

/// Request limits applied by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Deadline for one publish round trip.
    pub publish_timeout: Duration,
}

impl GatewaySettings {
    /// Derives settings from server configuration.
    #[must_use]
    pub const fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            publish_timeout: config.publish_timeout(),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Shared handler state.
pub struct GatewayState {
    /// Broker publisher.
    publisher: Arc<dyn Publisher>,
    /// Correlation id source.
    correlation: CorrelationIdGenerator,
    /// Request limits.
    settings: GatewaySettings,
}

impl GatewayState {
    /// Creates handler state around a publisher.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>, settings: GatewaySettings) -> Self {
        Self {
            publisher,
            correlation: CorrelationIdGenerator::new(),
            settings,
        }
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState").field("settings", &self.settings).finish_non_exhaustive()
    }
}

/// Client-facing error body.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    /// Short machine-readable reason.
    pub(crate) message: String,
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Handles `POST /sensors`.
pub async fn handle_sensor(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let correlation_id = state.correlation.issue();
    let (parts, body) = request.into_parts();
    let Some(account) = parts.extensions.get::<Account>().cloned() else {
        error!(correlation_id = %correlation_id, "request reached handler without an identity");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if let Err(err) = check_content_type(&parts.headers) {
        return client_error(&correlation_id, &err);
    }
    let bytes = match to_bytes(body, state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) if exceeds_body_limit(&err) => {
            debug!(correlation_id = %correlation_id, "request body exceeds limit");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
        Err(err) => {
            debug!(correlation_id = %correlation_id, error = %err, "request body read failed");
            return error_response(StatusCode::BAD_REQUEST, UNREADABLE_BODY_MESSAGE);
        }
    };
    let event = match validate(&bytes) {
        Ok(event) => event,
        Err(err) => return client_error(&correlation_id, &err),
    };
    let routing_key = compose(&account.tenant_id, event.device_id());
    let body = match event.to_body() {
        Ok(body) => body,
        Err(err) => {
            error!(correlation_id = %correlation_id, error = %err, "event serialization failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let message = OutboundMessage::json(routing_key, correlation_id, body);
    let outcome = tokio::time::timeout(state.settings.publish_timeout, state.publisher.publish(&message))
        .await
        .unwrap_or(Err(PublishError::Timeout));
    match outcome {
        Ok(()) => {
            info!(
                tenant_id = %account.tenant_id,
                routing_key = %message.routing_key,
                correlation_id = %message.correlation_id,
                "telemetry published"
            );
            StatusCode::OK.into_response()
        }
        Err(err) => publish_failure(&message, &err),
    }
}

/// Handles `GET /sensors/_health`.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Accepts a missing content type or any `application/json` media type.
fn check_content_type(headers: &HeaderMap) -> Result<(), ValidationError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let media_type = value
        .to_str()
        .ok()
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedContentType)
    }
}

/// Returns true when a body read failed on the configured size limit.
fn exceeds_body_limit(error: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Maps a validation failure to `400`.
fn client_error(correlation_id: &str, error: &ValidationError) -> Response {
    debug!(correlation_id = %correlation_id, kind = error.kind(), error = %error, "payload rejected");
    error_response(StatusCode::BAD_REQUEST, &error.to_string())
}

/// Builds a `{"message": ...}` response.
fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Maps a publish failure to `500` or `503` with an empty body.
fn publish_failure(message: &OutboundMessage, error: &PublishError) -> Response {
    let status = match error {
        PublishError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PublishError::Failed(_) | PublishError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(
        status = status.as_u16(),
        error = %error,
        routing_key = %message.routing_key,
        correlation_id = %message.correlation_id,
        payload = %String::from_utf8_lossy(&message.body),
        "publish failed"
    );
    status.into_response()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
