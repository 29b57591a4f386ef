// crates/sensor-gate-server/src/lib.rs
// ============================================================================
// Module: Sensor Gate Server Library
// Description: HTTP surface for telemetry ingestion.
// Purpose: Authenticate, validate, and publish sensor telemetry over HTTP.
// Dependencies: axum, axum-server, reqwest, sensor-gate-core, tracing
// ============================================================================

//! ## Overview
//! `sensor-gate-server` exposes `POST /sensors` behind bearer authentication
//! and `GET /sensors/_health`. Accepted events are published through the
//! core [`sensor_gate_core::Publisher`] seam under a bounded deadline.
//! Invariants:
//! - A request that fails authentication or validation never publishes.
//! - Each accepted request results in exactly one publish attempt.
//! - Broker internals are never echoed to callers.
//!
//! Security posture: every request body and header is untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod cache;
pub mod gateway;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::Account;
pub use auth::AuthError;
pub use auth::HttpIdentityProvider;
pub use auth::IdentityProvider;
pub use auth::StaticIdentityProvider;
pub use auth::identity_provider_from_config;
pub use cache::CachingIdentityProvider;
pub use gateway::GatewaySettings;
pub use gateway::GatewayState;
pub use server::HEALTH_PATH;
pub use server::SENSORS_PATH;
pub use server::ServerError;
pub use server::build_router;
pub use server::serve;
