//! opbroker-mcp - 1Password secrets broker over MCP.
//!
//! Central secrets service: resolves credentials from 1Password and
//! hands them to callers through controlled channels (tool results,
//! subprocess environments, owner-only files).
//!
//! Environment variables:
//!   OP_SERVICE_ACCOUNT_TOKEN  - Required. 1Password service account token.
//!   OP_VAULT                  - Optional. Default vault name (default: "AI").
//!   OP_CLI_PATH               - Optional. Path to the `op` binary.
//!   MCP_TRANSPORT             - Optional. "stdio" or "http" (default: "http").
//!   MCP_HOST                  - Optional. Host to bind (default: "0.0.0.0").
//!   MCP_PORT                  - Optional. Port to bind (default: 6975).
//!   MCP_PATH                  - Optional. HTTP path (default: "/mcp").

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use opbroker_core::BrokerConfig;
use opbroker_mcp::state::{ServiceState, ServiceStatus};
use opbroker_mcp::{http, McpServer};

#[derive(Parser)]
#[command(name = "opbroker-mcp")]
#[command(about = "1Password secrets broker over the Model Context Protocol")]
#[command(version)]
struct Cli {
    /// Transport: stdio for local pipe use, http for network service
    #[arg(long, env = "MCP_TRANSPORT", default_value = "http")]
    transport: String,

    /// Host to bind (http transport)
    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (http transport)
    #[arg(long, env = "MCP_PORT", default_value_t = 6975)]
    port: u16,

    /// HTTP path that accepts the RPC stream
    #[arg(long, env = "MCP_PATH", default_value = "/mcp")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging to stderr - stdout is reserved for the protocol stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BrokerConfig::from_env();

    // Some MCP clients call the network transport "streamable-http";
    // accept the alias.
    let transport = match cli.transport.as_str() {
        "streamable-http" => "http".to_string(),
        other => other.to_string(),
    };
    let path = if cli.path.starts_with('/') {
        cli.path.clone()
    } else {
        format!("/{}", cli.path)
    };

    let status = ServiceStatus {
        name: "opbroker",
        version: env!("CARGO_PKG_VERSION"),
        vault: config.default_vault.clone(),
        transport: transport.clone(),
        host: cli.host.clone(),
        port: cli.port,
        path: path.clone(),
    };

    let state = Arc::new(ServiceState::new(config, status));
    let server = Arc::new(McpServer::new(state));

    match transport.as_str() {
        "stdio" => {
            tracing::info!("Starting opbroker MCP server on stdio");
            server.run_stdio().await?;
        }
        "http" => {
            let addr = format!("{}:{}", cli.host, cli.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, path = %path, "Starting opbroker MCP server over http");
            axum::serve(listener, http::router(server, &path)).await?;
        }
        other => anyhow::bail!("unknown transport: {other} (expected stdio or http)"),
    }

    Ok(())
}
