// crates/sensor-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for sensor-gate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use sensor_gate_config::AuthMode;
use sensor_gate_config::ConfigError;
use sensor_gate_config::GatewayConfig;
use sensor_gate_config::StaticTokenConfig;

pub type TestResult = Result<(), String>;

/// Returns a config with defaults and an HTTP auth-check endpoint.
pub fn minimal_config() -> Result<GatewayConfig, ConfigError> {
    GatewayConfig::from_toml_bytes(b"[auth]\ncheck_uri = \"http://127.0.0.1:9000/check\"\n")
}

/// Returns a minimal config using a single static token.
pub fn static_config(token: &str, tenant: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config = minimal_config()?;
    config.auth.mode = AuthMode::Static;
    config.auth.tokens = vec![StaticTokenConfig {
        token: token.to_string(),
        tenant_id: tenant.to_string(),
        capabilities: vec!["sensor:write".to_string()],
    }];
    Ok(config)
}

/// Asserts that validation failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

/// Environment lookup backed by a fixed list of pairs.
pub fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let pairs: Vec<(String, String)> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    move |key: &str| pairs.iter().find(|(name, _)| name == key).map(|(_, value)| value.clone())
}
