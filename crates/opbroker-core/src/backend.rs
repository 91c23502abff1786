//! Vault backend capability surface.
//!
//! The broker never talks to 1Password directly; it goes through this
//! trait. The production adapter lives in [`crate::opcli`], tests
//! substitute an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque failure from the vault backend. Wrapped, not interpreted:
/// during resolution fallback it counts as a failed candidate, elsewhere
/// it propagates as-is.
#[derive(Error, Debug)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

/// (vault, item, field) triple identifying one scalar value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub vault: String,
    pub item: String,
    pub field: String,
}

impl SecretRef {
    pub fn new(
        vault: impl Into<String>,
        item: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            vault: vault.into(),
            item: item.into(),
            field: field.into(),
        }
    }

    /// Backend lookup path, `op://{vault}/{item}/{field}`.
    pub fn to_path(&self) -> String {
        format!("op://{}/{}/{}", self.vault, self.item, self.field)
    }
}

/// Filters for item enumeration. All optional; `query` matches item
/// titles case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub query: Option<String>,
    pub vault: Option<String>,
    pub category: Option<String>,
}

/// One item as seen in listings - metadata only, no field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub title: String,
    pub vault: String,
    pub category: String,
}

/// One field in an item create payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemField {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub value: String,
}

/// Item create payload in the backend's template shape. The vault is
/// carried out-of-band (the adapter passes it as a flag, not in the
/// serialized template).
#[derive(Debug, Clone, Serialize)]
pub struct ItemPayload {
    pub title: String,
    pub category: String,
    #[serde(skip)]
    pub vault: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub fields: Vec<ItemField>,
}

/// Capability contract for the secrets backend. Implementations must be
/// shareable across concurrent invocations; the broker holds a single
/// handle for the server lifetime.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Resolve a single field to its secret value.
    async fn resolve(&self, secret: &SecretRef) -> Result<String, BackendError>;

    /// Enumerate items visible to the service account.
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ItemSummary>, BackendError>;

    /// Create an item, returning the backend-assigned id.
    async fn create_item(&self, payload: &ItemPayload) -> Result<String, BackendError>;
}
