// crates/sensor-gate-config/src/lib.rs
// ============================================================================
// Module: Sensor Gate Config Library
// Description: Canonical config model, environment overrides, and validation.
// Purpose: Single source of truth for gateway configuration semantics.
// Dependencies: sensor-gate-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `sensor-gate-config` defines the configuration model for the gateway:
//! listener, broker topology and reconnect policy, identity provider, and
//! logging. Loading is strict and fail-closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
