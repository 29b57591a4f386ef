// crates/sensor-gate-server/src/auth.rs
// ============================================================================
// Module: Authentication
// Description: Bearer-token identity resolution and the auth middleware.
// Purpose: Attach an authorized account to every ingestion request.
// Dependencies: async-trait, axum, reqwest, sensor-gate-config, sensor-gate-core
// ============================================================================

//! ## Overview
//! [`require_sensor_write`] extracts `Authorization: Bearer <token>`, resolves
//! it through an [`IdentityProvider`], checks the `sensor:write` capability,
//! and stores the resulting [`Account`] in request extensions. Any failure
//! answers `401` (or `503` when the provider is unreachable) before the
//! handler runs.
//! Security posture: authentication is a trust boundary; fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use reqwest::Client;
use reqwest::header::HeaderValue;
use sensor_gate_config::AuthConfig;
use sensor_gate_config::AuthMode;
use sensor_gate_config::StaticTokenConfig;
use sensor_gate_core::Capability;
use sensor_gate_core::TenantId;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::cache::CachingIdentityProvider;
use crate::gateway::ErrorBody;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on the `Authorization` header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Account
// ============================================================================

/// Authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Tenant owning the token.
    pub tenant_id: TenantId,
    /// Granted capabilities.
    pub capabilities: BTreeSet<Capability>,
}

impl Account {
    /// Returns true when the account holds `capability`.
    #[must_use]
    pub fn can(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures.
///
/// # Invariants
/// - Variants are stable for response mapping.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, or unknown credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Credentials lack the required capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Identity provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Resolves bearer tokens into accounts.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token is not accepted.
    async fn authenticate(&self, token: &str) -> Result<Account, AuthError>;
}

/// Builds the provider selected by configuration.
///
/// HTTP lookups are cached when `auth.cache_ttl_ms` is non-zero.
///
/// # Errors
///
/// Returns [`AuthError`] when the provider cannot be constructed.
pub fn identity_provider_from_config(
    config: &AuthConfig,
) -> Result<Arc<dyn IdentityProvider>, AuthError> {
    match config.mode {
        AuthMode::Http => {
            let check_uri = config.check_uri.clone().ok_or_else(|| {
                AuthError::Unavailable("auth check uri not configured".to_string())
            })?;
            let provider: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(
                check_uri,
                config.connect_timeout(),
                config.request_timeout(),
            )?);
            match config.cache_ttl() {
                Some(ttl) => Ok(Arc::new(CachingIdentityProvider::new(
                    provider,
                    ttl,
                    config.cache_max_entries,
                ))),
                None => Ok(provider),
            }
        }
        AuthMode::Static => Ok(Arc::new(StaticIdentityProvider::from_config(&config.tokens)?)),
    }
}

// ============================================================================
// SECTION: Static Provider
// ============================================================================

/// Token table from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    /// Accounts keyed by token.
    accounts: BTreeMap<String, Account>,
}

impl StaticIdentityProvider {
    /// Creates an empty provider that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token for an account.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, account: Account) -> Self {
        self.accounts.insert(token.into(), account);
        self
    }

    /// Builds the provider from configured tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when a tenant identifier is invalid.
    pub fn from_config(tokens: &[StaticTokenConfig]) -> Result<Self, AuthError> {
        let mut provider = Self::new();
        for entry in tokens {
            let tenant_id = TenantId::parse(entry.tenant_id.as_str())
                .map_err(|err| AuthError::Unauthenticated(format!("invalid tenant id: {err}")))?;
            let capabilities = entry.capabilities.iter().map(Capability::new).collect();
            provider = provider.with_token(
                entry.token.trim(),
                Account {
                    tenant_id,
                    capabilities,
                },
            );
        }
        Ok(provider)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Account, AuthError> {
        self.accounts
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated("unknown token".to_string()))
    }
}

// ============================================================================
// SECTION: HTTP Provider
// ============================================================================

/// Auth-check response body.
#[derive(Debug, Deserialize)]
struct AuthCheckResponse {
    /// Tenant identifier.
    id: String,
    /// Role name to access letters (`r`, `w`).
    #[serde(default)]
    roles: BTreeMap<String, String>,
}

/// Identity provider backed by a remote auth-check endpoint.
///
/// # Invariants
/// - Every lookup is bounded by the configured timeouts.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    /// Auth-check endpoint.
    check_uri: String,
    /// HTTP client configured with timeouts.
    client: Client,
}

impl HttpIdentityProvider {
    /// Builds a provider for the auth-check endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] when the HTTP client cannot be built.
    pub fn new(
        check_uri: String,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;
        Ok(Self {
            check_uri,
            client,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Account, AuthError> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AuthError::Unauthenticated("invalid token".to_string()))?;
        let response = self
            .client
            .get(&self.check_uri)
            .header(reqwest::header::AUTHORIZATION, value)
            .send()
            .await
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;
        match response.status() {
            reqwest::StatusCode::OK => {
                let body: AuthCheckResponse = response
                    .json()
                    .await
                    .map_err(|err| AuthError::Unavailable(format!("invalid auth response: {err}")))?;
                let tenant_id = TenantId::parse(body.id)
                    .map_err(|err| AuthError::Unauthenticated(format!("invalid tenant id: {err}")))?;
                Ok(Account {
                    tenant_id,
                    capabilities: capabilities_from_roles(&body.roles),
                })
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(AuthError::Unauthenticated("token rejected".to_string()))
            }
            status => Err(AuthError::Unavailable(format!("auth check returned {status}"))),
        }
    }
}

/// Expands role access letters into capabilities.
fn capabilities_from_roles(roles: &BTreeMap<String, String>) -> BTreeSet<Capability> {
    let mut capabilities = BTreeSet::new();
    for (role, access) in roles {
        if access.contains('w') {
            capabilities.insert(Capability::new(format!("{role}:write")));
        }
        if access.contains('r') {
            capabilities.insert(Capability::new(format!("{role}:read")));
        }
    }
    capabilities
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Requires a bearer token with the `sensor:write` capability.
pub async fn require_sensor_write(
    State(provider): State<Arc<dyn IdentityProvider>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request.headers().get(AUTHORIZATION).map(|value| value.to_str());
    let header = match header {
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => return auth_failure(&AuthError::Unauthenticated("non-ascii header".into())),
        None => None,
    };
    let token = match parse_bearer_token(header) {
        Ok(token) => token,
        Err(err) => return auth_failure(&err),
    };
    let account = match provider.authenticate(&token).await {
        Ok(account) => account,
        Err(err) => return auth_failure(&err),
    };
    if !account.can(&Capability::sensor_write()) {
        return auth_failure(&AuthError::Unauthorized(format!(
            "tenant {} lacks {}",
            account.tenant_id,
            Capability::SENSOR_WRITE
        )));
    }
    request.extensions_mut().insert(account);
    next.run(request).await
}

/// Maps an auth failure to a response.
fn auth_failure(error: &AuthError) -> Response {
    match error {
        AuthError::Unavailable(reason) => {
            warn!(error = %reason, "identity provider unavailable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        AuthError::Unauthenticated(_) | AuthError::Unauthorized(_) => {
            debug!(error = %error, "request rejected by auth");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    message: "unauthorized".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Parses a bearer token from an authorization header.
pub(crate) fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
