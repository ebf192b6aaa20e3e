//! Model Context Protocol tool servers over stdio.

pub mod client;
pub mod registry;
pub mod tool;

pub use registry::{register_mcp_tools, McpConnections, McpServerStatus};
