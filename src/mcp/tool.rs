use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_schema::{CallToolResult, ContentBlock, Tool as McpToolDefinition};
use serde_json::{json, Map, Value};

use super::client::StdioClient;
use crate::core::tools::{Tool, ToolError, ToolSchema};

/// A tool served by an MCP server, exposed to the model under its own name.
pub struct McpTool {
    client: Arc<StdioClient>,
    schema: ToolSchema,
}

impl McpTool {
    pub fn new(client: Arc<StdioClient>, definition: &McpToolDefinition) -> Self {
        let parameters = serde_json::to_value(&definition.input_schema)
            .unwrap_or_else(|_| json!({"type": "object"}));
        let description = definition
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool provided by MCP server '{}'", client.server_id()));
        Self {
            schema: ToolSchema::new(definition.name.clone(), description, parameters),
            client,
        }
    }

    pub fn server_id(&self) -> &str {
        self.client.server_id()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let result = self
            .client
            .call_tool(&self.schema.name, arguments)
            .await
            .map_err(ToolError::Execution)?;
        call_result_text(&result)
    }
}

/// Joins text blocks, falling back to structured content, then to the raw
/// content JSON. `isError` results become tool errors carrying that text.
pub fn call_result_text(result: &CallToolResult) -> Result<String, ToolError> {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::TextContent(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect();

    let text = if !texts.is_empty() {
        texts.join("\n")
    } else if let Some(structured) = &result.structured_content {
        Value::Object(structured.clone()).to_string()
    } else if result.content.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&result.content).unwrap_or_default()
    };

    if result.is_error.unwrap_or(false) {
        let message = if text.is_empty() {
            "MCP tool reported an error.".to_string()
        } else {
            text
        };
        return Err(ToolError::Execution(message));
    }
    Ok(text)
}
