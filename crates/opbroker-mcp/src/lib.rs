//! opbroker MCP server
//!
//! Exposes the 1Password secrets broker to agents and automation via the
//! Model Context Protocol: JSON-RPC 2.0 over stdio for local pipe use,
//! or over HTTP for network service.

pub mod handler;
pub mod http;
pub mod protocol;
pub mod server;
pub mod state;
pub mod tools;

pub use server::McpServer;
pub use state::{ServiceState, ServiceStatus};
