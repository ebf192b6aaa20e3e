//! Assembles the pieces a session needs from the effective config.

use std::sync::Arc;

use tracing::info;

use crate::core::config::Config;
use crate::core::orchestrator::TurnOrchestrator;
use crate::core::providers::{build_stream_client, resolve_session, ProviderResolutionError};
use crate::core::tools::builtin::register_builtin_tools;
use crate::core::tools::ToolRegistry;
use crate::mcp::{register_mcp_tools, McpConnections};

pub struct Session {
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Keeps MCP servers running for the life of the session.
    pub connections: McpConnections,
}

/// Built-in tools first, then MCP tools in config order.
pub async fn build_tool_registry(config: &Config) -> (ToolRegistry, McpConnections) {
    let mut registry = ToolRegistry::new();
    if config.builtin_tools_enabled() {
        register_builtin_tools(&mut registry);
    }
    let connections = register_mcp_tools(config, &mut registry, config.request_timeout()).await;
    info!(
        tools = registry.len(),
        mcp_servers = connections.connected(),
        "Tool registry ready"
    );
    (registry, connections)
}

pub async fn build_session(config: &Config) -> Result<Session, ProviderResolutionError> {
    let provider = resolve_session(config)?;
    let client = build_stream_client(&provider, config)?;
    let (registry, connections) = build_tool_registry(config).await;
    let orchestrator = TurnOrchestrator::new(client, Arc::new(registry), config.turn_options());
    Ok(Session {
        orchestrator: Arc::new(orchestrator),
        connections,
    })
}

pub fn provider_error_lines(err: &ProviderResolutionError) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let fixes = err.quick_fixes();
    if !fixes.is_empty() {
        lines.push(String::new());
        lines.push("💡 Quick fixes:".to_string());
        lines.extend(fixes.iter().map(|fix| format!("  • {fix}")));
    }
    lines
}

pub fn exit_with_provider_error(err: ProviderResolutionError) -> ! {
    for line in provider_error_lines(&err) {
        eprintln!("{line}");
    }
    std::process::exit(err.exit_code());
}
