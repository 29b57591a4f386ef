// crates/sensor-gate-core/src/identifiers.rs
// ============================================================================
// Module: Sensor Gate Identifiers
// Description: Tenant, device, and capability identifiers.
// Purpose: Provide strongly typed IDs that are safe to embed in routing keys.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings with validated construction. Tenant IDs may
//! not contain topic-routing metacharacters, so a composed routing key always
//! has exactly two segments. Device IDs must parse as a UUID of any variant;
//! the original text is preserved verbatim for routing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Characters with meaning inside topic routing keys and binding patterns.
const ROUTING_METACHARACTERS: [char; 3] = ['.', '*', '#'];

/// Maximum tenant identifier length in bytes.
const MAX_TENANT_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier construction failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier was empty after trimming.
    #[error("identifier is empty")]
    Empty,
    /// Identifier exceeded the maximum length.
    #[error("identifier exceeds {MAX_TENANT_ID_LENGTH} bytes")]
    TooLong,
    /// Identifier contained a routing metacharacter or whitespace.
    #[error("identifier contains reserved character {0:?}")]
    ReservedCharacter(char),
    /// Identifier is not a UUID.
    #[error("identifier is not a uuid")]
    NotUuid,
}

// ============================================================================
// SECTION: Tenant Identifier
// ============================================================================

/// Tenant (account) identifier resolved by the identity provider.
///
/// # Invariants
/// - Non-empty, at most 128 bytes.
/// - Contains no `.`, `*`, `#`, or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parses a tenant identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty, too long, or
    /// contains a reserved character.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if value.len() > MAX_TENANT_ID_LENGTH {
            return Err(IdentifierError::TooLong);
        }
        if let Some(ch) =
            value.chars().find(|ch| ROUTING_METACHARACTERS.contains(ch) || ch.is_whitespace())
        {
            return Err(IdentifierError::ReservedCharacter(ch));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for TenantId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

// ============================================================================
// SECTION: Device Identifier
// ============================================================================

/// Sensor device identifier taken from the telemetry `id` field.
///
/// # Invariants
/// - The stored text parses as a UUID (hyphenated, simple, braced, or URN).
/// - The stored text is exactly what the device sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parses a device identifier, keeping the original text.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::NotUuid`] when the value is not a UUID.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        Uuid::try_parse(value).map_err(|_| IdentifierError::NotUuid)?;
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Capabilities
// ============================================================================

/// Named permission granted to an authenticated identity (`resource:access`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Capability required to publish sensor telemetry.
    pub const SENSOR_WRITE: &'static str = "sensor:write";

    /// Creates a capability from its `resource:access` label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the `sensor:write` capability.
    #[must_use]
    pub fn sensor_write() -> Self {
        Self::new(Self::SENSOR_WRITE)
    }

    /// Returns the capability label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap for clarity."
    )]

    use super::*;

    #[test]
    fn tenant_id_rejects_routing_metacharacters() {
        assert_eq!(TenantId::parse("a.b"), Err(IdentifierError::ReservedCharacter('.')));
        assert_eq!(TenantId::parse("a#"), Err(IdentifierError::ReservedCharacter('#')));
        assert_eq!(TenantId::parse("*"), Err(IdentifierError::ReservedCharacter('*')));
        assert_eq!(TenantId::parse("a b"), Err(IdentifierError::ReservedCharacter(' ')));
        assert_eq!(TenantId::parse(""), Err(IdentifierError::Empty));
    }

    #[test]
    fn tenant_id_accepts_uuid_text() {
        let tenant = TenantId::parse("7b3c1a52-0f0e-4c55-9a2b-2f4f8d1e6a10").unwrap();
        assert_eq!(tenant.as_str(), "7b3c1a52-0f0e-4c55-9a2b-2f4f8d1e6a10");
    }

    #[test]
    fn tenant_id_deserialization_is_validated() {
        let ok: TenantId = serde_json::from_str("\"T1\"").unwrap();
        assert_eq!(ok.as_str(), "T1");
        assert!(serde_json::from_str::<TenantId>("\"T.1\"").is_err());
    }

    #[test]
    fn device_id_keeps_original_text() {
        let simple = DeviceId::parse("cd0a6b8aa32f4cecbd4d38b24ac793e0").unwrap();
        assert_eq!(simple.as_str(), "cd0a6b8aa32f4cecbd4d38b24ac793e0");
        let upper = DeviceId::parse("CD0A6B8A-A32F-4CEC-BD4D-38B24AC793E0").unwrap();
        assert_eq!(upper.as_str(), "CD0A6B8A-A32F-4CEC-BD4D-38B24AC793E0");
    }

    #[test]
    fn device_id_rejects_non_uuid() {
        assert_eq!(DeviceId::parse("not-a-uuid"), Err(IdentifierError::NotUuid));
        assert_eq!(DeviceId::parse(""), Err(IdentifierError::NotUuid));
    }
}
