//! Error taxonomy for broker operations.
//!
//! Every message here is safe to log and return to callers: errors are
//! built from item, vault, intent, and field names, never from resolved
//! values.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::BackendError;

/// Broker-level errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Required authentication material is missing. Fatal at first
    /// backend use.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every candidate field was tried and none resolved.
    #[error("unable to resolve any fields for item '{item}' in vault '{vault}' with intent '{intent}' (tried: {})", .candidates.join(", "))]
    Resolution {
        item: String,
        vault: String,
        intent: String,
        candidates: Vec<String>,
    },

    /// The intent normalized to an empty string - nothing to try.
    #[error("no candidate fields for intent '{intent}' on item '{item}'")]
    NoCandidates { item: String, intent: String },

    /// The child process could not be spawned.
    #[error("failed to execute command: {0}")]
    Execution(String),

    /// Destination file already present - never overwritten.
    #[error("refusing to overwrite existing file: {}", .0.display())]
    FileExists(PathBuf),

    /// Malformed request input, rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// Opaque failure from the vault backend.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
