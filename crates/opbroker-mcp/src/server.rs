//! MCP server core.
//!
//! Processes JSON-RPC 2.0 messages independently of the transport: the
//! stdio loop lives here, the HTTP binding in [`crate::http`] feeds the
//! same dispatch. Tool calls and resource reads go through the shared
//! [`ServiceState`].

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::handler::handle_tool;
use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListResourcesResult,
    ListToolsResult, ReadResourceParams, ReadResourceResult, Resource, ResourcesCapability,
    ServerCapabilities, ServerInfo, TextResourceContents, ToolsCapability, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::state::ServiceState;
use crate::tools::all_tools;

const STATUS_URI: &str = "opbroker://status";
const ITEMS_URI: &str = "opbroker://items";

/// MCP server shared across transports and, on the HTTP path, across
/// concurrent clients.
pub struct McpServer {
    state: Arc<ServiceState>,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self {
            state,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Run the stdio transport: one JSON-RPC message per line on stdin,
    /// responses on stdout. Logging goes to stderr.
    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);

        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("Client disconnected");
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            if let Some(response) = self.handle_message(line).await {
                let rendered = serde_json::to_string(&response)?;
                debug!("Sending: {}", rendered);
                stdout.write_all(rendered.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC message. Notifications produce no
    /// response.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        let id = request.id.clone();

        if id.is_none() {
            self.handle_notification(&request.method).await;
            return None;
        }

        match self.handle_request(&request.method, request.params).await {
            Ok(value) => Some(JsonRpcResponse::success(id, value)),
            Err((code, message)) => Some(JsonRpcResponse::error(id, code, message)),
        }
    }

    async fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                info!("Client initialized");
                self.initialized.store(true, Ordering::SeqCst);
            }
            "notifications/cancelled" => {
                debug!("Request cancelled");
            }
            _ => {
                debug!("Unknown notification: {}", method);
            }
        }
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, (i32, String)> {
        match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(params).await,
            "resources/list" => self.handle_list_resources(),
            "resources/read" => self.handle_read_resource(params).await,
            "ping" => Ok(json!({})),
            _ => {
                warn!("Unknown method: {}", method);
                Err((METHOD_NOT_FOUND, format!("Method not found: {method}")))
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, (i32, String)> {
        info!("Initializing MCP server");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
                resources: Some(ResourcesCapability { subscribe: false }),
            },
            server_info: ServerInfo {
                name: self.state.status.name.to_string(),
                version: self.state.status.version.to_string(),
            },
        };

        to_value(result)
    }

    fn handle_list_tools(&self) -> Result<Value, (i32, String)> {
        to_value(ListToolsResult { tools: all_tools() })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, (i32, String)> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))?,
            None => return Err((INVALID_PARAMS, "Missing params".to_string())),
        };

        info!("Calling tool: {}", params.name);
        let result = handle_tool(&self.state, &params.name, params.arguments).await;

        to_value(result)
    }

    fn handle_list_resources(&self) -> Result<Value, (i32, String)> {
        let resources = vec![
            Resource {
                uri: STATUS_URI.to_string(),
                name: "Broker Status".to_string(),
                description: Some(
                    "Service configuration: default vault, transport, and bind settings. No secret material.".to_string(),
                ),
                mime_type: Some("application/json".to_string()),
            },
            Resource {
                uri: ITEMS_URI.to_string(),
                name: "Vault Items".to_string(),
                description: Some(
                    "All items visible to the service account - metadata only.".to_string(),
                ),
                mime_type: Some("application/json".to_string()),
            },
        ];

        to_value(ListResourcesResult { resources })
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value, (i32, String)> {
        let params: ReadResourceParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))?,
            None => return Err((INVALID_PARAMS, "Missing params".to_string())),
        };

        let text = match params.uri.as_str() {
            STATUS_URI => serde_json::to_string_pretty(&self.state.status)
                .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {e}")))?,
            ITEMS_URI => {
                let broker = self
                    .state
                    .broker()
                    .await
                    .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
                let items = broker
                    .list_items(None, None, None)
                    .await
                    .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
                serde_json::to_string_pretty(&items)
                    .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {e}")))?
            }
            _ => return Err((INVALID_PARAMS, format!("Unknown resource: {}", params.uri))),
        };

        let result = ReadResourceResult {
            contents: vec![TextResourceContents {
                uri: params.uri,
                mime_type: "application/json".to_string(),
                text,
            }],
        };

        to_value(result)
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, (i32, String)> {
    serde_json::to_value(value).map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {e}")))
}
