// crates/sensor-gate-server/src/cache.rs
// ============================================================================
// Module: Identity Cache
// Description: TTL-bounded cache in front of an identity provider.
// Purpose: Avoid one auth-check round trip per ingested event.
// Dependencies: async-trait, tokio, tracing, crate::auth
// ============================================================================

//! ## Overview
//! [`CachingIdentityProvider`] remembers accounts resolved by an inner
//! provider, keyed by bearer token, for a fixed lifetime. Only successful
//! lookups are cached; rejected tokens and provider outages always reach
//! the inner provider again.
//! Invariants:
//! - An entry is never served after its expiry.
//! - The cache never holds more than `max_entries` tokens.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::auth::Account;
use crate::auth::AuthError;
use crate::auth::IdentityProvider;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Cached lookup result.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Resolved account.
    account: Account,
    /// Instant after which the entry is stale.
    expires_at: Instant,
}

/// Identity provider decorator caching successful lookups.
pub struct CachingIdentityProvider {
    /// Provider consulted on a miss.
    inner: Arc<dyn IdentityProvider>,
    /// Lifetime of an entry.
    ttl: Duration,
    /// Capacity bound.
    max_entries: usize,
    /// Entries keyed by token.
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CachingIdentityProvider {
    /// Wraps `inner` with a cache of at most `max_entries` tokens.
    #[must_use]
    pub fn new(inner: Arc<dyn IdentityProvider>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of cached tokens, including stale ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a live cached account for `token`.
    fn lookup(&self, token: &str, now: Instant) -> Option<Account> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(token) {
            Some(entry) if entry.expires_at > now => Some(entry.account.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    /// Stores an account, evicting stale entries and then the oldest when full.
    fn store(&self, token: &str, account: Account, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(token) {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        while entries.len() >= self.max_entries && !entries.contains_key(token) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
        entries.insert(
            token.to_string(),
            CacheEntry {
                account,
                expires_at: now + self.ttl,
            },
        );
    }
}

impl std::fmt::Debug for CachingIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingIdentityProvider")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for CachingIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Account, AuthError> {
        if let Some(account) = self.lookup(token, Instant::now()) {
            return Ok(account);
        }
        let account = self.inner.authenticate(token).await?;
        debug!(tenant_id = %account.tenant_id, "caching identity lookup");
        self.store(token, account.clone(), Instant::now());
        Ok(account)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
