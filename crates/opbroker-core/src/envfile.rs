//! File egress: write resolved secrets to a fresh, owner-only file.
//!
//! The destination is opened with exclusive-create semantics and 0600
//! permissions in a single call, so the file never exists with looser
//! access and a concurrent writer on the same path loses the race
//! cleanly instead of clobbering anything.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::backend::VaultBackend;
use crate::error::BrokerError;
use crate::resolve::{self, DEFAULT_INTENT};

/// File mode applied at creation time: read/write for the owner only.
const FILE_MODE: u32 = 0o600;

/// Supported serializations for the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileFormat {
    Dotenv,
    Export,
    Json,
}

impl EnvFileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvFileFormat::Dotenv => "dotenv",
            EnvFileFormat::Export => "export",
            EnvFileFormat::Json => "json",
        }
    }
}

impl FromStr for EnvFileFormat {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dotenv" => Ok(EnvFileFormat::Dotenv),
            "export" => Ok(EnvFileFormat::Export),
            "json" => Ok(EnvFileFormat::Json),
            other => Err(BrokerError::Validation(format!(
                "unsupported format '{other}' (expected dotenv, export, or json)"
            ))),
        }
    }
}

/// One secret to write: the item to resolve and the key it is stored
/// under in the output file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSecretSpec {
    pub item: String,
    pub key: String,
    #[serde(default)]
    pub intent: Option<String>,
}

/// Outcome of a file egress call - key names and metadata, never values.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub path: String,
    pub format: String,
    pub keys: Vec<String>,
    pub permissions: String,
}

pub async fn write_env_file(
    backend: &dyn VaultBackend,
    path: &Path,
    specs: &[FileSecretSpec],
    vault: &str,
    format: EnvFileFormat,
) -> Result<WriteResult, BrokerError> {
    // Resolve everything before touching the filesystem; a failed spec
    // must not leave a partial file behind.
    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
        let intent = spec.intent.as_deref().unwrap_or(DEFAULT_INTENT);
        let secret = resolve::resolve(backend, &spec.item, intent, vault).await?;
        entries.push((spec.key.clone(), secret.value));
    }

    let content = render(&entries, format)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => BrokerError::FileExists(path.to_path_buf()),
            _ => BrokerError::Io(e),
        })?;
    file.write_all(content.as_bytes())?;

    info!(path = %path.display(), format = format.as_str(), keys = entries.len(), "wrote env file");

    Ok(WriteResult {
        path: path.display().to_string(),
        format: format.as_str().to_string(),
        keys: entries.into_iter().map(|(k, _)| k).collect(),
        permissions: format!("{FILE_MODE:04o}"),
    })
}

/// Serialize entries in the requested format, preserving caller order.
/// dotenv/export quoting does not escape embedded double quotes; values
/// containing them will not round-trip (known limitation).
fn render(entries: &[(String, String)], format: EnvFileFormat) -> Result<String, BrokerError> {
    match format {
        EnvFileFormat::Dotenv => Ok(entries
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\"\n"))
            .collect()),
        EnvFileFormat::Export => Ok(entries
            .iter()
            .map(|(k, v)| format!("export {k}=\"{v}\"\n"))
            .collect()),
        EnvFileFormat::Json => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), serde_json::Value::String(v.clone()));
            }
            let mut rendered = serde_json::to_string_pretty(&map)
                .map_err(|e| BrokerError::Validation(e.to_string()))?;
            rendered.push('\n');
            Ok(rendered)
        }
    }
}
