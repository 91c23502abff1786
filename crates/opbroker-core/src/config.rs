//! Process-wide backend configuration, read from the environment at
//! startup and immutable thereafter.

use crate::error::BrokerError;

/// Vault used when a caller does not name one.
pub const DEFAULT_VAULT: &str = "AI";

/// Service-account token variable. Absence is fatal at first backend use.
pub const TOKEN_ENV: &str = "OP_SERVICE_ACCOUNT_TOKEN";
/// Default vault override.
pub const VAULT_ENV: &str = "OP_VAULT";
/// Override for the `op` binary location.
pub const OP_CLI_ENV: &str = "OP_CLI_PATH";

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Service-account token; checked at first backend use, not at startup.
    pub service_account_token: Option<String>,
    /// Default vault for operations that don't name one.
    pub default_vault: String,
    /// Path to the `op` binary (resolved via PATH when unset).
    pub op_path: String,
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        Self {
            service_account_token: non_empty_var(TOKEN_ENV),
            default_vault: non_empty_var(VAULT_ENV).unwrap_or_else(|| DEFAULT_VAULT.to_string()),
            op_path: non_empty_var(OP_CLI_ENV).unwrap_or_else(|| "op".to_string()),
        }
    }

    /// The token, or the fatal configuration error surfaced at first
    /// backend use.
    pub fn require_token(&self) -> Result<&str, BrokerError> {
        self.service_account_token.as_deref().ok_or_else(|| {
            BrokerError::Configuration(format!(
                "{TOKEN_ENV} is not set - cannot authenticate with 1Password"
            ))
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
