//! Shared server state: bind settings plus the lazily-built broker.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

use opbroker_core::backend::VaultBackend;
use opbroker_core::broker::Broker;
use opbroker_core::config::BrokerConfig;
use opbroker_core::error::BrokerError;
use opbroker_core::opcli::OpCliBackend;

/// Diagnostic status document served by the status resource and the
/// health endpoint. Metadata only, no secret material.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub vault: String,
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

pub struct ServiceState {
    pub status: ServiceStatus,
    config: BrokerConfig,
    broker: OnceCell<Broker>,
}

impl ServiceState {
    pub fn new(config: BrokerConfig, status: ServiceStatus) -> Self {
        Self {
            status,
            config,
            broker: OnceCell::new(),
        }
    }

    /// For tests and embedding: a state with a pre-built broker, so no
    /// real backend is ever constructed.
    pub fn with_broker(config: BrokerConfig, status: ServiceStatus, broker: Broker) -> Self {
        Self {
            status,
            config,
            broker: OnceCell::new_with(Some(broker)),
        }
    }

    /// The broker, built on first use. The backend handle is created
    /// exactly once per server lifetime and shared by every subsequent
    /// invocation; a missing token surfaces here as a configuration
    /// error.
    pub async fn broker(&self) -> Result<&Broker, BrokerError> {
        self.broker
            .get_or_try_init(|| async {
                let token = self.config.require_token()?;
                let backend: Arc<dyn VaultBackend> =
                    Arc::new(OpCliBackend::new(&self.config.op_path, token));
                Ok(Broker::new(backend, self.config.default_vault.clone()))
            })
            .await
    }
}
