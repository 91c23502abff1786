//! Broker - the operations surface the RPC layer dispatches into.
//!
//! Owns the shared backend handle and the process-wide default vault.
//! One instance is built per server lifetime and shared by every
//! invocation; nothing here holds secret state between calls.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{ItemFilter, ItemSummary, SecretRef, VaultBackend};
use crate::envfile::{self, EnvFileFormat, FileSecretSpec, WriteResult};
use crate::error::BrokerError;
use crate::exec::{self, EnvSecretSpec, RunResult};
use crate::items::{self, FieldMeta, UpsertResult};
use crate::resolve::{self, ResolvedSecret, DEFAULT_INTENT};

/// Username/password pair for login-shaped items. Debug output hides
/// both values.
#[derive(Clone, Serialize)]
pub struct Login {
    pub item: String,
    pub vault: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("item", &self.item)
            .field("vault", &self.vault)
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct Broker {
    backend: Arc<dyn VaultBackend>,
    default_vault: String,
}

impl Broker {
    pub fn new(backend: Arc<dyn VaultBackend>, default_vault: impl Into<String>) -> Self {
        Self {
            backend,
            default_vault: default_vault.into(),
        }
    }

    pub fn default_vault(&self) -> &str {
        &self.default_vault
    }

    fn vault<'a>(&'a self, vault: Option<&'a str>) -> &'a str {
        vault.filter(|v| !v.is_empty()).unwrap_or(&self.default_vault)
    }

    /// Resolve one secret by item and intent (default `password`).
    pub async fn resolve_secret(
        &self,
        item: &str,
        intent: Option<&str>,
        vault: Option<&str>,
    ) -> Result<ResolvedSecret, BrokerError> {
        resolve::resolve(
            self.backend.as_ref(),
            item,
            intent.unwrap_or(DEFAULT_INTENT),
            self.vault(vault),
        )
        .await
    }

    /// Username/password pair for one item. The username field is
    /// optional in the backend (empty when absent); the password goes
    /// through intent fallback and is required.
    pub async fn resolve_login(
        &self,
        item: &str,
        vault: Option<&str>,
    ) -> Result<Login, BrokerError> {
        let vault = self.vault(vault);
        let username = self
            .backend
            .resolve(&SecretRef::new(vault, item, "username"))
            .await
            .unwrap_or_default();
        let password = resolve::resolve(self.backend.as_ref(), item, "password", vault).await?;
        Ok(Login {
            item: item.to_string(),
            vault: vault.to_string(),
            username,
            password: password.value,
        })
    }

    /// Enumerate items. No filter means all items the service account
    /// can see, across vaults.
    pub async fn list_items(
        &self,
        query: Option<&str>,
        vault: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<ItemSummary>, BrokerError> {
        let filter = ItemFilter {
            query: query.map(str::to_string),
            vault: vault.map(str::to_string),
            category: category.map(str::to_string),
        };
        self.backend
            .list_items(&filter)
            .await
            .map_err(BrokerError::from)
    }

    /// Create an item shaped by kind. The returned structure carries
    /// field metadata only, never values.
    pub async fn upsert_item(
        &self,
        name: &str,
        kind: &str,
        fields: &[(String, String)],
        vault: Option<&str>,
        tags: &[String],
    ) -> Result<UpsertResult, BrokerError> {
        let vault = self.vault(vault);
        let payload = items::build_payload(name, kind, fields, vault, tags);
        let id = self.backend.create_item(&payload).await?;
        Ok(UpsertResult {
            name: name.to_string(),
            vault: vault.to_string(),
            kind: kind.to_string(),
            created: true,
            tags: tags.to_vec(),
            fields: payload.fields.iter().map(FieldMeta::from).collect(),
            id,
        })
    }

    /// Subprocess egress (see [`crate::exec`]).
    pub async fn run_with_secrets(
        &self,
        command: &[String],
        specs: &[EnvSecretSpec],
        vault: Option<&str>,
        working_dir: Option<&str>,
        timeout_secs: u64,
    ) -> Result<RunResult, BrokerError> {
        exec::run_with_secrets(
            self.backend.as_ref(),
            command,
            specs,
            self.vault(vault),
            working_dir,
            timeout_secs,
        )
        .await
    }

    /// File egress (see [`crate::envfile`]).
    pub async fn write_env_file(
        &self,
        path: &Path,
        specs: &[FileSecretSpec],
        vault: Option<&str>,
        format: EnvFileFormat,
    ) -> Result<WriteResult, BrokerError> {
        envfile::write_env_file(
            self.backend.as_ref(),
            path,
            specs,
            self.vault(vault),
            format,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;

    fn broker(backend: FakeBackend) -> Broker {
        Broker::new(Arc::new(backend), "AI")
    }

    #[tokio::test]
    async fn default_vault_applies_when_unspecified() {
        let backend = FakeBackend::new().with_secret("AI", "netbox", "password", "netbox-pass");
        let broker = broker(backend);

        let resolved = broker.resolve_secret("netbox", None, None).await.unwrap();
        assert_eq!(resolved.vault, "AI");
        assert_eq!(resolved.value, "netbox-pass");
    }

    #[tokio::test]
    async fn explicit_vault_overrides_the_default() {
        let backend = FakeBackend::new().with_secret("Vault2", "api", "api_key", "api-token-123");
        let broker = broker(backend);

        let resolved = broker
            .resolve_secret("api", Some("api_key"), Some("Vault2"))
            .await
            .unwrap();
        assert_eq!(resolved.vault, "Vault2");
        assert_eq!(resolved.field, "api_key");
    }

    #[tokio::test]
    async fn resolve_login_returns_the_pair() {
        let backend = FakeBackend::new()
            .with_secret("AI", "netbox", "username", "admin")
            .with_secret("AI", "netbox", "password", "netbox-pass");
        let broker = broker(backend);

        let login = broker.resolve_login("netbox", None).await.unwrap();
        assert_eq!(login.username, "admin");
        assert_eq!(login.password, "netbox-pass");
    }

    #[tokio::test]
    async fn resolve_login_tolerates_a_missing_username() {
        let backend = FakeBackend::new().with_secret("AI", "service", "password", "svc-pass");
        let broker = broker(backend);

        let login = broker.resolve_login("service", None).await.unwrap();
        assert!(login.username.is_empty());
        assert_eq!(login.password, "svc-pass");
    }

    #[tokio::test]
    async fn resolve_login_requires_the_password() {
        let backend = FakeBackend::new().with_secret("AI", "service", "username", "admin");
        let broker = broker(backend);

        let err = broker.resolve_login("service", None).await.unwrap_err();
        assert!(matches!(err, BrokerError::Resolution { .. }));
    }

    #[tokio::test]
    async fn list_items_filters_by_query_and_vault() {
        let backend = FakeBackend::new()
            .with_item("1", "NetBox", "AI", "LOGIN")
            .with_item("2", "API Token", "Vault2", "SECURE_NOTE");
        let broker = broker(backend);

        let items = broker
            .list_items(Some("api"), Some("Vault2"), None)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "API Token");
        assert_eq!(items[0].vault, "Vault2");
    }

    #[tokio::test]
    async fn upsert_result_carries_metadata_only() {
        let backend = FakeBackend::new();
        let broker = broker(backend);

        let result = broker
            .upsert_item(
                "New Login",
                "password",
                &[
                    ("username".to_string(), "user1".to_string()),
                    ("password".to_string(), "pass1".to_string()),
                ],
                None,
                &["prod".to_string()],
            )
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.vault, "AI");
        assert_eq!(result.id, "new-item-id");
        assert_eq!(result.tags, ["prod"]);

        let rendered = serde_json::to_string(&result).unwrap();
        assert!(!rendered.contains("user1"));
        assert!(!rendered.contains("pass1"));
        assert!(rendered.contains("username"));
        assert!(rendered.contains("PASSWORD"));
    }

    #[test]
    fn login_debug_output_is_redacted() {
        let login = Login {
            item: "netbox".to_string(),
            vault: "AI".to_string(),
            username: "admin".to_string(),
            password: "netbox-pass".to_string(),
        };
        let rendered = format!("{login:?}");
        assert!(!rendered.contains("netbox-pass"));
        assert!(!rendered.contains("admin"));
    }
}
