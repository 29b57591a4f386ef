// crates/sensor-gate-core/src/event.rs
// ============================================================================
// Module: Telemetry Event Validation
// Description: Structural validation for inbound sensor telemetry payloads.
// Purpose: Turn raw request bodies into validated events or client errors.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! A telemetry event is any JSON object carrying a string `id` that parses as
//! a UUID. Every other field passes through untouched, so the event keeps the
//! full parsed map rather than a fixed record.
//! Invariants:
//! - [`validate`] is pure and never allocates beyond the parsed map.
//! - [`TelemetryEvent::to_body`] re-serializes the complete original map.
//!
//! Security posture: request bodies are untrusted input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::identifiers::DeviceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field carrying the device identifier.
pub const DEVICE_ID_FIELD: &str = "id";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failures for inbound telemetry.
///
/// # Invariants
/// - `Display` output is the client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Body is not valid JSON or not a JSON object.
    #[error("{0}")]
    MalformedJson(String),
    /// Body is empty, `null`, or an object without fields.
    #[error("empty payload")]
    EmptyPayload,
    /// `id` is absent or not a string.
    #[error("missing id field")]
    MissingId,
    /// `id` is not a syntactically valid UUID.
    #[error("id must be UUID")]
    InvalidId,
    /// Declared content type is not JSON.
    #[error("content type must be application/json")]
    UnsupportedContentType,
}

impl ValidationError {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedJson(_) => "malformed_json",
            Self::EmptyPayload => "empty_payload",
            Self::MissingId => "missing_id",
            Self::InvalidId => "invalid_id",
            Self::UnsupportedContentType => "unsupported_content_type",
        }
    }
}

// ============================================================================
// SECTION: Telemetry Event
// ============================================================================

/// Validated telemetry event.
///
/// # Invariants
/// - `fields` contains `id` as a string equal to `device_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Device identifier from the `id` field.
    device_id: DeviceId,
    /// Complete parsed payload, including `id`.
    fields: Map<String, Value>,
}

impl TelemetryEvent {
    /// Returns the device identifier.
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns all payload fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Serializes the full payload for publishing.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.fields)
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Parses and validates a raw telemetry body.
///
/// # Errors
///
/// Returns [`ValidationError`] when the body is not a usable telemetry event.
pub fn validate(body: &[u8]) -> Result<TelemetryEvent, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::EmptyPayload);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ValidationError::MalformedJson(err.to_string()))?;
    let fields = match value {
        Value::Object(fields) => fields,
        Value::Null => return Err(ValidationError::EmptyPayload),
        _ => {
            return Err(ValidationError::MalformedJson(
                "payload must be a JSON object".to_string(),
            ));
        }
    };
    if fields.is_empty() {
        return Err(ValidationError::EmptyPayload);
    }
    let Some(Value::String(id)) = fields.get(DEVICE_ID_FIELD) else {
        return Err(ValidationError::MissingId);
    };
    let device_id = DeviceId::parse(id).map_err(|_| ValidationError::InvalidId)?;
    Ok(TelemetryEvent {
        device_id,
        fields,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
