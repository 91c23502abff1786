//! 1Password backend reached through the official `op` CLI.
//!
//! Each call spawns `op` with the service-account token in the child's
//! environment and a bounded wall-clock budget. Item create payloads
//! travel over stdin, so secret values never appear in the process
//! table.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::backend::{
    BackendError, ItemFilter, ItemPayload, ItemSummary, SecretRef, VaultBackend,
};
use crate::config::TOKEN_ENV;
use crate::items::matches_query;

/// Wall-clock budget for one `op` invocation.
const OP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpCliBackend {
    op_path: String,
    token: String,
}

impl OpCliBackend {
    pub fn new(op_path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            op_path: op_path.into(),
            token: token.into(),
        }
    }

    /// Run `op` with the given args, optionally feeding a payload on
    /// stdin, and return its stdout on success.
    async fn run_op(
        &self,
        args: &[String],
        stdin_payload: Option<Vec<u8>>,
    ) -> Result<String, BackendError> {
        let mut cmd = Command::new(&self.op_path);
        cmd.args(args)
            .env(TOKEN_ENV, &self.token)
            .stdin(if stdin_payload.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Args carry only vault/item/field names, safe to log.
        debug!(args = ?args, "invoking op");

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError(format!("failed to spawn {}: {e}", self.op_path)))?;

        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&payload)
                    .await
                    .map_err(|e| BackendError(format!("failed to write op stdin: {e}")))?;
            }
        }

        let output = match timeout(OP_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(BackendError(format!("op failed: {e}"))),
            Err(_) => {
                return Err(BackendError(format!(
                    "op timed out after {} seconds",
                    OP_TIMEOUT.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError(format!(
                "op exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn read_args(secret: &SecretRef) -> Vec<String> {
    vec![
        "read".to_string(),
        "--no-newline".to_string(),
        secret.to_path(),
    ]
}

fn list_args(filter: &ItemFilter) -> Vec<String> {
    let mut args = vec![
        "item".to_string(),
        "list".to_string(),
        "--format".to_string(),
        "json".to_string(),
    ];
    if let Some(vault) = &filter.vault {
        args.push("--vault".to_string());
        args.push(vault.clone());
    }
    if let Some(category) = &filter.category {
        args.push("--categories".to_string());
        args.push(category.clone());
    }
    args
}

fn create_args(payload: &ItemPayload) -> Vec<String> {
    vec![
        "item".to_string(),
        "create".to_string(),
        "--format".to_string(),
        "json".to_string(),
        "--vault".to_string(),
        payload.vault.clone(),
        "-".to_string(),
    ]
}

// `op item list` output shape, reduced to what the broker reports.
#[derive(Deserialize)]
struct RawItem {
    id: String,
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    vault: Option<RawVault>,
}

#[derive(Deserialize)]
struct RawVault {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

fn parse_item_list(raw: &str) -> Result<Vec<ItemSummary>, BackendError> {
    let items: Vec<RawItem> = serde_json::from_str(raw)
        .map_err(|e| BackendError(format!("unexpected op item list output: {e}")))?;
    Ok(items
        .into_iter()
        .map(|item| {
            let vault = item
                .vault
                .map(|v| if v.name.is_empty() { v.id } else { v.name })
                .unwrap_or_default();
            ItemSummary {
                id: item.id,
                title: item.title,
                vault,
                category: item.category,
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct CreatedItem {
    id: String,
}

#[async_trait]
impl VaultBackend for OpCliBackend {
    async fn resolve(&self, secret: &SecretRef) -> Result<String, BackendError> {
        self.run_op(&read_args(secret), None).await
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ItemSummary>, BackendError> {
        let raw = self.run_op(&list_args(filter), None).await?;
        let items = parse_item_list(&raw)?;
        // `op item list` has no title search; filter client-side.
        Ok(items
            .into_iter()
            .filter(|i| matches_query(&i.title, filter.query.as_deref()))
            .collect())
    }

    async fn create_item(&self, payload: &ItemPayload) -> Result<String, BackendError> {
        let template = serde_json::to_vec(payload)
            .map_err(|e| BackendError(format!("failed to serialize item template: {e}")))?;
        let raw = self.run_op(&create_args(payload), Some(template)).await?;
        let created: CreatedItem = serde_json::from_str(&raw)
            .map_err(|e| BackendError(format!("unexpected op item create output: {e}")))?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_args_build_the_lookup_path() {
        let args = read_args(&SecretRef::new("AI", "netbox", "password"));
        assert_eq!(args, ["read", "--no-newline", "op://AI/netbox/password"]);
    }

    #[test]
    fn list_args_include_optional_filters() {
        let args = list_args(&ItemFilter {
            query: Some("net".to_string()),
            vault: Some("AI".to_string()),
            category: Some("LOGIN".to_string()),
        });
        assert_eq!(
            args,
            ["item", "list", "--format", "json", "--vault", "AI", "--categories", "LOGIN"]
        );

        // The title query is client-side, never an op flag.
        assert!(!args.contains(&"net".to_string()));
    }

    #[test]
    fn create_args_read_the_template_from_stdin() {
        let payload = ItemPayload {
            title: "New Login".to_string(),
            category: "LOGIN".to_string(),
            vault: "AI".to_string(),
            tags: vec![],
            fields: vec![],
        };
        let args = create_args(&payload);
        assert_eq!(
            args,
            ["item", "create", "--format", "json", "--vault", "AI", "-"]
        );
    }

    #[test]
    fn item_list_output_parses_to_summaries() {
        let raw = r#"[
            {"id": "1", "title": "NetBox", "category": "LOGIN", "vault": {"id": "v1", "name": "AI"}},
            {"id": "2", "title": "API Token", "category": "SECURE_NOTE", "vault": {"id": "v2", "name": "Vault2"}}
        ]"#;
        let items = parse_item_list(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "NetBox");
        assert_eq!(items[0].vault, "AI");
        assert_eq!(items[1].category, "SECURE_NOTE");
    }

    #[test]
    fn garbage_list_output_is_a_backend_error() {
        assert!(parse_item_list("not json").is_err());
    }

    #[test]
    fn serialized_template_omits_the_vault() {
        let payload = ItemPayload {
            title: "New Login".to_string(),
            category: "LOGIN".to_string(),
            vault: "AI".to_string(),
            tags: vec![],
            fields: vec![],
        };
        let rendered = serde_json::to_string(&payload).unwrap();
        assert!(!rendered.contains("vault"));
        assert!(rendered.contains("LOGIN"));
    }
}
