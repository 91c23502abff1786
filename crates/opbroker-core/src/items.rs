//! Item listing helpers and creation templates.
//!
//! `upsert_item` shapes its payload by kind: known kinds get a fixed
//! field template, anything else passes the supplied fields through
//! verbatim as concealed fields.

use serde::Serialize;

use crate::backend::{ItemField, ItemPayload};

const CONCEALED: &str = "CONCEALED";
const STRING: &str = "STRING";

/// Backend category for a logical kind.
pub fn category_for(kind: &str) -> &'static str {
    match kind {
        "password" => "LOGIN",
        "api_key" | "token" | "secret" => "API_CREDENTIAL",
        "ssh_key" => "SSH_KEY",
        _ => "SECURE_NOTE",
    }
}

/// Field metadata echoed back to callers - id, type, and purpose, never
/// the value.
#[derive(Debug, Clone, Serialize)]
pub struct FieldMeta {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl From<&ItemField> for FieldMeta {
    fn from(field: &ItemField) -> Self {
        Self {
            id: field.id.clone(),
            field_type: field.field_type.clone(),
            purpose: field.purpose.clone(),
        }
    }
}

/// Result of an item upsert - metadata only.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    pub name: String,
    pub vault: String,
    pub kind: String,
    pub created: bool,
    pub tags: Vec<String>,
    pub fields: Vec<FieldMeta>,
    pub id: String,
}

fn field(id: &str, field_type: &str, purpose: Option<&str>, value: &str) -> ItemField {
    ItemField {
        id: id.to_string(),
        field_type: field_type.to_string(),
        purpose: purpose.map(str::to_string),
        value: value.to_string(),
    }
}

/// Build the create payload for a kind. `fields` pairs keep the caller's
/// order, which is also the order of the verbatim fallback.
pub fn build_payload(
    name: &str,
    kind: &str,
    fields: &[(String, String)],
    vault: &str,
    tags: &[String],
) -> ItemPayload {
    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    };

    let shaped = match kind {
        "password" => vec![
            field("username", STRING, Some("USERNAME"), get("username")),
            field("password", CONCEALED, Some("PASSWORD"), get("password")),
        ],
        "api_key" | "token" | "secret" => {
            // Prefer an explicit api_key field, fall back to the first
            // supplied value.
            let value = match get("api_key") {
                "" => fields.first().map(|(_, v)| v.as_str()).unwrap_or(""),
                v => v,
            };
            vec![field("api_key", CONCEALED, None, value)]
        }
        "ssh_key" => vec![
            field("private_key", CONCEALED, None, get("private_key")),
            field("public_key", CONCEALED, None, get("public_key")),
            field("passphrase", CONCEALED, None, get("passphrase")),
        ],
        _ => fields
            .iter()
            .map(|(k, v)| field(k, CONCEALED, None, v))
            .collect(),
    };

    ItemPayload {
        title: name.to_string(),
        category: category_for(kind).to_string(),
        vault: vault.to_string(),
        tags: tags.to_vec(),
        fields: shaped,
    }
}

/// Case-insensitive title match used by listing backends.
pub fn matches_query(title: &str, query: Option<&str>) -> bool {
    match query {
        None => true,
        Some(q) => title.to_lowercase().contains(&q.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn password_kind_uses_the_login_template() {
        let payload = build_payload(
            "New Login",
            "password",
            &pairs(&[("username", "user1"), ("password", "pass1")]),
            "AI",
            &["prod".to_string()],
        );

        assert_eq!(payload.category, "LOGIN");
        assert_eq!(payload.fields.len(), 2);
        assert_eq!(payload.fields[0].id, "username");
        assert_eq!(payload.fields[0].value, "user1");
        assert_eq!(payload.fields[0].purpose.as_deref(), Some("USERNAME"));
        assert_eq!(payload.fields[1].id, "password");
        assert_eq!(payload.fields[1].value, "pass1");
    }

    #[test]
    fn ssh_key_kind_carries_the_key_triple() {
        let payload = build_payload(
            "SSH Key",
            "ssh_key",
            &pairs(&[
                ("private_key", "PRIVATE"),
                ("public_key", "PUBLIC"),
                ("passphrase", "secret-pass"),
            ]),
            "AI",
            &[],
        );

        assert_eq!(payload.category, "SSH_KEY");
        let values: Vec<&str> = payload.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, ["PRIVATE", "PUBLIC", "secret-pass"]);
    }

    #[test]
    fn token_kinds_collapse_to_a_single_api_key_field() {
        let payload = build_payload(
            "CI Token",
            "token",
            &pairs(&[("api_key", "tok-123")]),
            "AI",
            &[],
        );
        assert_eq!(payload.category, "API_CREDENTIAL");
        assert_eq!(payload.fields.len(), 1);
        assert_eq!(payload.fields[0].id, "api_key");
        assert_eq!(payload.fields[0].value, "tok-123");

        // Without an explicit api_key key, the first supplied value is used.
        let payload = build_payload("CI Token", "secret", &pairs(&[("value", "s3cr3t")]), "AI", &[]);
        assert_eq!(payload.fields[0].value, "s3cr3t");
    }

    #[test]
    fn unknown_kind_passes_fields_through_verbatim() {
        let payload = build_payload(
            "Custom",
            "database",
            &pairs(&[("host", "db.local"), ("dsn", "postgres://...")]),
            "AI",
            &[],
        );

        assert_eq!(payload.category, "SECURE_NOTE");
        assert_eq!(payload.fields.len(), 2);
        assert_eq!(payload.fields[0].id, "host");
        assert_eq!(payload.fields[1].id, "dsn");
        assert!(payload.fields.iter().all(|f| f.field_type == "CONCEALED"));
    }

    #[test]
    fn query_matching_is_case_insensitive() {
        assert!(matches_query("NetBox Admin", Some("netbox")));
        assert!(matches_query("NetBox Admin", None));
        assert!(!matches_query("NetBox Admin", Some("router")));
    }
}
