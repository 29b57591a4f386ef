// crates/sensor-gate-core/src/routing.rs
// ============================================================================
// Module: Routing Keys
// Description: Routing-key composition and topic pattern matching.
// Purpose: Map (tenant, device) pairs onto hierarchical topic routing keys.
// Dependencies: crate::identifiers
// ============================================================================

//! ## Overview
//! Routing keys have the form `<tenantID>.<deviceID>`. Both parts are copied
//! verbatim; [`crate::TenantId`] and [`crate::DeviceId`] guarantee neither part
//! contains the delimiter, so consumers can scope by tenant with
//! `<tenantID>.#`. [`topic_matches`] implements topic-exchange matching for
//! in-process brokers and tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::identifiers::DeviceId;
use crate::identifiers::TenantId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between routing-key segments.
pub const ROUTING_KEY_DELIMITER: char = '.';

// ============================================================================
// SECTION: Routing Key
// ============================================================================

/// Topic routing key for a published telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Returns the routing key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Composes the routing key for a tenant's device.
#[must_use]
pub fn compose(tenant: &TenantId, device: &DeviceId) -> RoutingKey {
    let mut key = String::with_capacity(tenant.as_str().len() + device.as_str().len() + 1);
    key.push_str(tenant.as_str());
    key.push(ROUTING_KEY_DELIMITER);
    key.push_str(device.as_str());
    RoutingKey(key)
}

// ============================================================================
// SECTION: Topic Matching
// ============================================================================

/// Returns true when `routing_key` matches a topic binding `pattern`.
///
/// `*` matches exactly one segment and `#` matches zero or more segments.
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(ROUTING_KEY_DELIMITER).collect();
    let key: Vec<&str> = routing_key.split(ROUTING_KEY_DELIMITER).collect();
    match_segments(&pattern, &key)
}

/// Recursive segment matcher for topic patterns.
fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0 ..= key.len()).any(|skip| match_segments(rest, &key[skip ..])),
        Some((&"*", rest)) => !key.is_empty() && match_segments(rest, &key[1 ..]),
        Some((segment, rest)) => {
            key.first().is_some_and(|first| first == segment) && match_segments(rest, &key[1 ..])
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
