use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::client::StdioClient;
use super::tool::McpTool;
use crate::core::config::data::{Config, McpServerConfig};
use crate::core::tools::ToolRegistry;

/// Outcome of bringing up one configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpServerStatus {
    Connected { id: String, tools: usize },
    Failed { id: String, error: String },
}

impl McpServerStatus {
    pub fn describe(&self) -> String {
        match self {
            McpServerStatus::Connected { id, tools } => {
                format!("MCP server '{id}' connected ({tools} tools)")
            }
            McpServerStatus::Failed { id, error } => {
                format!("MCP server '{id}' unavailable: {error}")
            }
        }
    }
}

/// Live MCP clients. Dropping this stops the servers.
#[derive(Default)]
pub struct McpConnections {
    clients: Vec<Arc<StdioClient>>,
    statuses: Vec<McpServerStatus>,
}

impl McpConnections {
    pub fn statuses(&self) -> &[McpServerStatus] {
        &self.statuses
    }

    pub fn connected(&self) -> usize {
        self.clients.len()
    }
}

async fn connect_server(
    server: &McpServerConfig,
    registry: &mut ToolRegistry,
    request_timeout: Duration,
) -> Result<(Arc<StdioClient>, usize), String> {
    let client = StdioClient::connect(server, request_timeout).await?;
    client.initialize().await?;
    let tools = client.list_tools().await?;

    let mut registered = 0;
    for definition in tools
        .iter()
        .filter(|definition| server.allows_tool(&definition.name))
    {
        registry.register(Arc::new(McpTool::new(client.clone(), definition)));
        registered += 1;
    }
    Ok((client, registered))
}

/// Connects every enabled server and registers its tools. Servers that fail
/// are logged and skipped.
pub async fn register_mcp_tools(
    config: &Config,
    registry: &mut ToolRegistry,
    request_timeout: Duration,
) -> McpConnections {
    let mut connections = McpConnections::default();

    for server in config.enabled_mcp_servers() {
        match connect_server(server, registry, request_timeout).await {
            Ok((client, tools)) => {
                info!(server_id = %server.id, tools, "MCP server connected");
                connections.clients.push(client);
                connections.statuses.push(McpServerStatus::Connected {
                    id: server.id.clone(),
                    tools,
                });
            }
            Err(error) => {
                warn!(server_id = %server.id, error = %error, "MCP server failed to start");
                connections.statuses.push(McpServerStatus::Failed {
                    id: server.id.clone(),
                    error,
                });
            }
        }
    }

    connections
}
