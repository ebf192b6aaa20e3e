use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Tool, ToolError, ToolSchema};
use crate::core::message::{ToolCallRequest, ToolResult};

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: ToolSchema,
    validator: Option<jsonschema::Validator>,
}

/// Name-indexed set of tools, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A tool with the same name replaces the earlier one
    /// in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        let validator = match jsonschema::validator_for(&schema.parameters) {
            Ok(validator) => Some(validator),
            Err(err) => {
                warn!(
                    tool = %schema.name,
                    error = %err,
                    "Tool schema is not valid JSON Schema; arguments will not be validated"
                );
                None
            }
        };

        let entry = RegisteredTool {
            tool,
            schema,
            validator,
        };

        match self.by_name.get(&entry.schema.name) {
            Some(&index) => {
                debug!(tool = %entry.schema.name, "Replacing registered tool");
                self.tools[index] = entry;
            }
            None => {
                self.by_name
                    .insert(entry.schema.name.clone(), self.tools.len());
                self.tools.push(entry);
            }
        }
    }

    pub fn list_tools(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|entry| entry.schema.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.tools[index].tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs one tool call. Every failure mode is folded into a failure
    /// [`ToolResult`] so the conversation can carry on.
    pub async fn invoke(
        &self,
        request: &ToolCallRequest,
        timeout: Duration,
        cancel_token: &CancellationToken,
    ) -> ToolResult {
        match self.try_invoke(request, timeout, cancel_token).await {
            Ok(content) => ToolResult::success(request, content),
            Err(err) => ToolResult::failure(request, err),
        }
    }

    async fn try_invoke(
        &self,
        request: &ToolCallRequest,
        timeout: Duration,
        cancel_token: &CancellationToken,
    ) -> Result<String, String> {
        let Some(&index) = self.by_name.get(&request.name) else {
            return Err(format!("Unknown tool: '{}'", request.name));
        };
        let entry = &self.tools[index];

        let arguments = request
            .parse_arguments()
            .map_err(|err| ToolError::InvalidArguments(err).to_string())?;

        if let Some(validator) = &entry.validator {
            let instance = Value::Object(arguments.clone());
            let violations: Vec<String> = validator
                .iter_errors(&instance)
                .map(|err| err.to_string())
                .collect();
            if !violations.is_empty() {
                return Err(ToolError::InvalidArguments(violations.join("; ")).to_string());
            }
        }

        debug!(tool = %request.name, id = %request.id, "Invoking tool");
        let invocation = tokio::time::timeout(timeout, entry.tool.invoke(arguments));
        let outcome = tokio::select! {
            result = invocation => match result {
                Ok(inner) => inner,
                Err(_) => Err(ToolError::TimedOut {
                    tool: request.name.clone(),
                    limit: timeout,
                }),
            },
            _ = cancel_token.cancelled() => Err(ToolError::Cancelled),
        };

        outcome.map_err(|err| err.to_string())
    }
}
