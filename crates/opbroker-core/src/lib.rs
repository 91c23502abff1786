//! opbroker-core - Secret resolution and controlled egress
//!
//! "A secret should pass through the broker, never stick to it."
//!
//! This crate holds the broker's domain logic: the intent-based field
//! resolver, the two egress controllers (subprocess environment injection
//! and owner-only file writes), item listing/creation templates, and the
//! backend capability trait the 1Password adapter implements. Resolved
//! values live only for the duration of a call and are never logged or
//! echoed back in result structures.

pub mod backend;
pub mod broker;
pub mod config;
pub mod envfile;
pub mod error;
pub mod exec;
pub mod items;
pub mod opcli;
pub mod resolve;

pub use backend::{BackendError, ItemFilter, ItemSummary, SecretRef, VaultBackend};
pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::BrokerError;
