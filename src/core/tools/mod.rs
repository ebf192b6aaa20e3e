//! Tools the model can call mid-turn.
//!
//! A [`Tool`] describes itself with a [`ToolSchema`] (advertised to the model)
//! and runs with a JSON object of arguments. The [`ToolRegistry`] owns the set
//! of tools and turns every invocation into a [`ToolResult`], so a bad call
//! never escapes as an error.
//!
//! [`ToolResult`]: crate::core::message::ToolResult

pub mod builtin;
pub mod registry;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::api::{ChatToolDefinition, ChatToolFunction};

pub use registry::ToolRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn to_api_definition(&self) -> ChatToolDefinition {
        let description = if self.description.trim().is_empty() {
            None
        } else {
            Some(self.description.clone())
        };

        ChatToolDefinition {
            kind: "function".to_string(),
            function: ChatToolFunction {
                name: self.name.clone(),
                description,
                parameters: self.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    InvalidArguments(String),
    Execution(String),
    TimedOut { tool: String, limit: Duration },
    Cancelled,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::InvalidArguments(message) => {
                write!(f, "Invalid tool arguments: {message}")
            }
            ToolError::Execution(message) => write!(f, "{message}"),
            ToolError::TimedOut { tool, limit } => {
                if limit.subsec_millis() == 0 {
                    write!(f, "Tool '{tool}' timed out after {}s", limit.as_secs())
                } else {
                    write!(f, "Tool '{tool}' timed out after {}ms", limit.as_millis())
                }
            }
            ToolError::Cancelled => write!(f, "Tool call interrupted by user."),
        }
    }
}

impl std::error::Error for ToolError {}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, ToolError>;
}
