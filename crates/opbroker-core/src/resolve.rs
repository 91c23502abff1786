//! Intent-based field resolution with ordered fallback.
//!
//! An intent names the purpose of a secret ("password", "token"); the
//! resolver maps it to an ordered list of concrete field names and takes
//! the first one the backend can produce. Candidates are tried strictly
//! in list order, sequentially, and the first success wins.

use serde::Serialize;
use tracing::debug;

use crate::backend::{SecretRef, VaultBackend};
use crate::error::BrokerError;

/// Intent applied when a caller does not name one.
pub const DEFAULT_INTENT: &str = "password";

/// Static intent -> candidate field table. Order encodes priority.
const INTENT_FIELDS: &[(&str, &[&str])] = &[
    ("password", &["password", "credential", "secret"]),
    ("secret", &["secret", "password", "credential"]),
    ("token", &["token", "api_key", "credential"]),
    ("api_key", &["api_key", "token", "credential"]),
    ("ssh_key", &["private_key", "ssh_key", "key"]),
    ("credential", &["credential", "password", "token"]),
];

/// Candidate fields for an intent, in the order they should be tried.
/// Unmapped intents fall back to the normalized intent itself as the
/// sole candidate.
pub fn candidates_for(intent: &str) -> Vec<String> {
    let normalized = intent.trim().to_lowercase();
    if normalized.is_empty() {
        return Vec::new();
    }
    for (name, fields) in INTENT_FIELDS {
        if *name == normalized {
            return fields.iter().map(|f| f.to_string()).collect();
        }
    }
    vec![normalized]
}

/// A successfully resolved secret. The value is carried for the caller
/// but never shows up in Debug output.
#[derive(Clone, Serialize)]
pub struct ResolvedSecret {
    pub item: String,
    pub vault: String,
    /// Field that actually matched.
    pub field: String,
    /// Normalized intent the caller asked for.
    pub kind: String,
    pub value: String,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("item", &self.item)
            .field("vault", &self.vault)
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Resolve `item` in `vault` for `intent`. Individual candidate failures
/// are absorbed and recorded; only full exhaustion surfaces an error.
pub async fn resolve(
    backend: &dyn VaultBackend,
    item: &str,
    intent: &str,
    vault: &str,
) -> Result<ResolvedSecret, BrokerError> {
    let normalized = intent.trim().to_lowercase();
    let candidates = candidates_for(intent);
    if candidates.is_empty() {
        return Err(BrokerError::NoCandidates {
            item: item.to_string(),
            intent: normalized,
        });
    }

    let mut tried = Vec::with_capacity(candidates.len());
    for field in candidates {
        let reference = SecretRef::new(vault, item, &field);
        match backend.resolve(&reference).await {
            Ok(value) => {
                debug!(item, vault, field = %field, "resolved secret field");
                return Ok(ResolvedSecret {
                    item: item.to_string(),
                    vault: vault.to_string(),
                    field,
                    kind: normalized,
                    value,
                });
            }
            // A backend error is indistinguishable from an absent field
            // for fallback purposes: record the candidate and move on.
            Err(err) => {
                debug!(item, vault, field = %field, error = %err, "candidate failed");
                tried.push(field);
            }
        }
    }

    Err(BrokerError::Resolution {
        item: item.to_string(),
        vault: vault.to_string(),
        intent: normalized,
        candidates: tried,
    })
}
