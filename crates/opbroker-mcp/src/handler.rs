//! Tool dispatch.
//!
//! Decodes tool arguments, runs the matching broker operation, and
//! serializes the outcome into a text tool result. Argument validation
//! happens before the broker (and with it the backend) is touched.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

use opbroker_core::envfile::{EnvFileFormat, FileSecretSpec};
use opbroker_core::error::BrokerError;
use opbroker_core::exec::{EnvSecretSpec, DEFAULT_TIMEOUT_SECS};

use crate::protocol::ToolResult;
use crate::state::ServiceState;

/// Helper to get a string argument.
fn get_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Helper to get a required string argument.
fn require_str(args: &Map<String, Value>, key: &str) -> Result<String, BrokerError> {
    get_str(args, key)
        .ok_or_else(|| BrokerError::Validation(format!("missing required argument: {key}")))
}

/// Helper to get an integer argument.
fn get_u64(args: &Map<String, Value>, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

/// Decode a required argv list of strings.
fn require_command(args: &Map<String, Value>) -> Result<Vec<String>, BrokerError> {
    let raw = args
        .get("command")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BrokerError::Validation("missing required argument: command".to_string()))?;
    raw.iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                BrokerError::Validation("command entries must be strings".to_string())
            })
        })
        .collect()
}

/// Decode the `secrets` array into typed specs.
fn get_specs<T: serde::de::DeserializeOwned>(
    args: &Map<String, Value>,
) -> Result<Vec<T>, BrokerError> {
    match args.get("secrets") {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| BrokerError::Validation(format!("invalid secrets spec: {e}"))),
    }
}

/// Decode the `fields` object preserving the caller's key order.
fn require_fields(args: &Map<String, Value>) -> Result<Vec<(String, String)>, BrokerError> {
    let raw = args
        .get("fields")
        .and_then(|v| v.as_object())
        .ok_or_else(|| BrokerError::Validation("missing required argument: fields".to_string()))?;
    raw.iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|s| (k.clone(), s.to_string()))
                .ok_or_else(|| {
                    BrokerError::Validation(format!("field '{k}' must be a string value"))
                })
        })
        .collect()
}

fn get_tags(args: &Map<String, Value>) -> Vec<String> {
    args.get("tags")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, BrokerError> {
    serde_json::to_value(value).map_err(|e| BrokerError::Validation(e.to_string()))
}

/// Handle a tool call.
pub async fn handle_tool(
    state: &ServiceState,
    name: &str,
    arguments: Map<String, Value>,
) -> ToolResult {
    let outcome = match name {
        "resolve_secret" => resolve_secret(state, &arguments).await,
        "resolve_login" => resolve_login(state, &arguments).await,
        "list_items" => list_items(state, &arguments).await,
        "upsert_item" => upsert_item(state, &arguments).await,
        "run_with_secrets" => run_with_secrets(state, &arguments).await,
        "write_env_file" => write_env_file(state, &arguments).await,
        _ => {
            warn!("Unknown tool: {}", name);
            return ToolResult::error(format!("Unknown tool: {name}"));
        }
    };

    match outcome {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(format!("serialization error: {e}")),
        },
        Err(e) => ToolResult::error(e.to_string()),
    }
}

async fn resolve_secret(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let item = require_str(args, "item")?;
    let intent = get_str(args, "intent");
    let vault = get_str(args, "vault");

    let broker = state.broker().await?;
    let resolved = broker
        .resolve_secret(&item, intent.as_deref(), vault.as_deref())
        .await?;
    to_json(&resolved)
}

async fn resolve_login(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let item = require_str(args, "item")?;
    let vault = get_str(args, "vault");

    let broker = state.broker().await?;
    let login = broker.resolve_login(&item, vault.as_deref()).await?;
    to_json(&login)
}

async fn list_items(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let query = get_str(args, "query");
    let vault = get_str(args, "vault");
    let category = get_str(args, "category");

    let broker = state.broker().await?;
    let items = broker
        .list_items(query.as_deref(), vault.as_deref(), category.as_deref())
        .await?;
    to_json(&items)
}

async fn upsert_item(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let name = require_str(args, "name")?;
    let kind = require_str(args, "kind")?;
    let fields = require_fields(args)?;
    let vault = get_str(args, "vault");
    let tags = get_tags(args);

    let broker = state.broker().await?;
    let result = broker
        .upsert_item(&name, &kind, &fields, vault.as_deref(), &tags)
        .await?;
    to_json(&result)
}

async fn run_with_secrets(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let command = require_command(args)?;
    let specs: Vec<EnvSecretSpec> = get_specs(args)?;
    let vault = get_str(args, "vault");
    let working_dir = get_str(args, "working_dir");
    let timeout = get_u64(args, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS);

    let broker = state.broker().await?;
    let result = broker
        .run_with_secrets(
            &command,
            &specs,
            vault.as_deref(),
            working_dir.as_deref(),
            timeout,
        )
        .await?;
    to_json(&result)
}

async fn write_env_file(
    state: &ServiceState,
    args: &Map<String, Value>,
) -> Result<Value, BrokerError> {
    let path = require_str(args, "path")?;
    let specs: Vec<FileSecretSpec> = get_specs(args)?;
    let vault = get_str(args, "vault");
    // Format is validated before any resolution or I/O happens.
    let format: EnvFileFormat = get_str(args, "format")
        .unwrap_or_else(|| "dotenv".to_string())
        .parse()?;

    let broker = state.broker().await?;
    let result = broker
        .write_env_file(Path::new(&path), &specs, vault.as_deref(), format)
        .await?;
    to_json(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    use opbroker_core::backend::{
        BackendError, ItemFilter, ItemPayload, ItemSummary, SecretRef, VaultBackend,
    };
    use opbroker_core::broker::Broker;
    use opbroker_core::config::BrokerConfig;

    use crate::state::ServiceStatus;

    struct MapBackend {
        secrets: HashMap<(String, String, String), String>,
    }

    #[async_trait]
    impl VaultBackend for MapBackend {
        async fn resolve(&self, secret: &SecretRef) -> Result<String, BackendError> {
            let key = (
                secret.vault.clone(),
                secret.item.clone(),
                secret.field.clone(),
            );
            self.secrets
                .get(&key)
                .cloned()
                .ok_or_else(|| BackendError(format!("no value at {}", secret.to_path())))
        }

        async fn list_items(&self, _filter: &ItemFilter) -> Result<Vec<ItemSummary>, BackendError> {
            Ok(vec![])
        }

        async fn create_item(&self, _payload: &ItemPayload) -> Result<String, BackendError> {
            Ok("new-item-id".to_string())
        }
    }

    fn test_state() -> ServiceState {
        let mut secrets = HashMap::new();
        secrets.insert(
            ("AI".to_string(), "netbox".to_string(), "password".to_string()),
            "netbox-pass".to_string(),
        );
        let backend: Arc<dyn VaultBackend> = Arc::new(MapBackend { secrets });
        let broker = Broker::new(backend, "AI");
        let config = BrokerConfig {
            service_account_token: None,
            default_vault: "AI".to_string(),
            op_path: "op".to_string(),
        };
        let status = ServiceStatus {
            name: "opbroker",
            version: "0.0.0",
            vault: "AI".to_string(),
            transport: "stdio".to_string(),
            host: String::new(),
            port: 0,
            path: String::new(),
        };
        ServiceState::with_broker(config, status, broker)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn resolve_secret_round_trips_through_dispatch() {
        let state = test_state();
        let result = handle_tool(&state, "resolve_secret", args(json!({"item": "netbox"}))).await;
        assert!(!result.is_error);
        let text = &result.content[0].text;
        assert!(text.contains("\"field\": \"password\""));
        assert!(text.contains("netbox-pass"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_an_error_result() {
        let state = test_state();
        let result = handle_tool(&state, "resolve_secret", Map::new()).await;
        assert!(result.is_error);
        assert!(result.content[0].text.contains("item"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let state = test_state();
        let result = handle_tool(&state, "no_such_tool", Map::new()).await;
        assert!(result.is_error);
        assert!(result.content[0].text.contains("no_such_tool"));
    }

    #[tokio::test]
    async fn bad_env_file_format_fails_before_any_io() {
        let state = test_state();
        let result = handle_tool(
            &state,
            "write_env_file",
            args(json!({
                "path": "/nonexistent-dir/never-written.env",
                "secrets": [{"item": "netbox", "key": "DB_PASS"}],
                "format": "yaml"
            })),
        )
        .await;
        assert!(result.is_error);
        assert!(result.content[0].text.contains("unsupported format"));
    }

    #[tokio::test]
    async fn run_result_lists_names_not_values() {
        let state = test_state();
        let result = handle_tool(
            &state,
            "run_with_secrets",
            args(json!({
                "command": ["echo", "hello"],
                "secrets": [{"item": "netbox", "env": "SECRET_VAR"}]
            })),
        )
        .await;
        assert!(!result.is_error);
        let text = &result.content[0].text;
        assert!(text.contains("SECRET_VAR"));
        assert!(!text.contains("netbox-pass"));
    }
}
