//! Tool definitions for the secrets broker.
//!
//! Five tools cover the broker surface: resolution (single secret or
//! login pair), item listing/creation, and the two egress primitives.
//! The resolution tools return secret values; the egress tools return
//! only the names the secrets were delivered under.

use serde_json::{json, Value};

use crate::protocol::{InputSchema, Tool};

/// Create a tool definition with the given name, description, and schema
/// properties.
fn tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let props = properties.as_object().cloned().unwrap_or_default();
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties: props,
            required: required.into_iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// All broker tools.
pub fn all_tools() -> Vec<Tool> {
    vec![
        tool(
            "resolve_secret",
            "Resolve a secret from 1Password by item name and intent. Intents (password, secret, token, api_key, ssh_key, credential) map to an ordered list of field names; the first field that resolves wins. Unknown intents are treated as an explicit field name. Returns the secret value - treat it as sensitive.",
            json!({
                "item": {"type": "string", "description": "Item name in the vault (e.g. 'netbox')"},
                "intent": {"type": "string", "description": "Logical purpose of the secret, or an explicit field name (default: password)"},
                "vault": {"type": "string", "description": "Vault name (default: the configured vault)"}
            }),
            vec!["item"],
        ),
        tool(
            "resolve_login",
            "Resolve the username/password pair for a login item. The username field is optional; the password goes through intent fallback.",
            json!({
                "item": {"type": "string", "description": "Item name in the vault"},
                "vault": {"type": "string", "description": "Vault name (default: the configured vault)"}
            }),
            vec!["item"],
        ),
        tool(
            "list_items",
            "List items visible to the service account. Returns metadata only (id, title, vault, category) - no secret values.",
            json!({
                "query": {"type": "string", "description": "Case-insensitive title filter"},
                "vault": {"type": "string", "description": "Restrict to one vault"},
                "category": {"type": "string", "description": "Restrict to one category (e.g. LOGIN)"}
            }),
            vec![],
        ),
        tool(
            "upsert_item",
            "Create an item. Known kinds are templated: password -> username/password; api_key, token, secret -> a single api_key field; ssh_key -> private_key/public_key/passphrase. Any other kind stores the supplied fields verbatim. The response carries field metadata only, never values.",
            json!({
                "name": {"type": "string", "description": "Item title"},
                "kind": {"type": "string", "description": "Item kind (password, api_key, token, secret, ssh_key, or free-form)"},
                "fields": {"type": "object", "description": "Field values, keyed by field name"},
                "vault": {"type": "string", "description": "Vault name (default: the configured vault)"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Tags to attach"}
            }),
            vec!["name", "kind", "fields"],
        ),
        tool(
            "run_with_secrets",
            "Run a command with secrets injected as environment variables. The command is a literal argv list, never a shell string. Each secret names an item, an env var, and an optional intent. The child is killed after the timeout. The response carries the injected variable names, exit code, and captured output - never the secret values.",
            json!({
                "command": {"type": "array", "items": {"type": "string"}, "description": "Command and arguments, e.g. [\"psql\", \"-h\", \"db\"]"},
                "secrets": {"type": "array", "items": {
                    "type": "object",
                    "properties": {
                        "item": {"type": "string", "description": "Item name to resolve"},
                        "env": {"type": "string", "description": "Environment variable to set"},
                        "intent": {"type": "string", "description": "Resolution intent (default: password)"}
                    },
                    "required": ["item", "env"]
                }, "description": "Secrets to inject"},
                "vault": {"type": "string", "description": "Vault name (default: the configured vault)"},
                "working_dir": {"type": "string", "description": "Working directory for the command"},
                "timeout": {"type": "integer", "description": "Wall-clock limit in seconds (default: 30)"}
            }),
            vec!["command"],
        ),
        tool(
            "write_env_file",
            "Write secrets to a new file with owner-only (0600) permissions. Fails if the file already exists. Formats: dotenv (KEY=\"VALUE\"), export (export KEY=\"VALUE\"), json. The response carries the key names written, never the values.",
            json!({
                "path": {"type": "string", "description": "Destination path; must not exist"},
                "secrets": {"type": "array", "items": {
                    "type": "object",
                    "properties": {
                        "item": {"type": "string", "description": "Item name to resolve"},
                        "key": {"type": "string", "description": "Key name in the output file"},
                        "intent": {"type": "string", "description": "Resolution intent (default: password)"}
                    },
                    "required": ["item", "key"]
                }, "description": "Secrets to write"},
                "vault": {"type": "string", "description": "Vault name (default: the configured vault)"},
                "format": {"type": "string", "enum": ["dotenv", "export", "json"], "description": "Output format (default: dotenv)"}
            }),
            vec!["path", "secrets"],
        ),
    ]
}
