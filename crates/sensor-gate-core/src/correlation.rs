// crates/sensor-gate-core/src/correlation.rs
// ============================================================================
// Module: Correlation Identifiers
// Description: Generation of per-message correlation identifiers.
// Purpose: Give every publish attempt a unique, opaque tracing token.
// Dependencies: base64, uuid
// ============================================================================

//! ## Overview
//! Correlation IDs are 16 bytes rendered as unpadded URL-safe base64 (22
//! characters): an 8-byte boot-scoped random prefix followed by an 8-byte
//! monotonic counter. IDs are unique within a process and collide across
//! processes only if two boots draw the same random prefix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use uuid::Uuid;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Boot-scoped correlation ID generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Random prefix drawn once per generator.
    boot_id: [u8; 8],
    /// Monotonic counter for IDs issued by this generator.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator with a fresh random prefix.
    #[must_use]
    pub fn new() -> Self {
        let random = Uuid::new_v4();
        let mut boot_id = [0u8; 8];
        boot_id.copy_from_slice(&random.as_bytes()[.. 8]);
        Self {
            boot_id,
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a new correlation ID.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 16];
        bytes[.. 8].copy_from_slice(&self.boot_id);
        bytes[8 ..].copy_from_slice(&seq.to_be_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
