use std::path::PathBuf;
use std::time::Duration;

use crate::core::config::data::Config;
use crate::core::orchestrator::TurnOptions;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_ASSISTANT_NAME: &str = "Astrid";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Astrid, an AI assistant that helps users with a variety of tasks.";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const LOG_FILE_NAME: &str = "astrid.log";

impl Config {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    pub fn assistant_name(&self) -> &str {
        self.assistant_name
            .as_deref()
            .unwrap_or(DEFAULT_ASSISTANT_NAME)
    }

    /// The system prompt, or `None` when explicitly set to an empty string.
    pub fn system_prompt(&self) -> Option<&str> {
        match self.system_prompt.as_deref() {
            Some(prompt) if prompt.trim().is_empty() => None,
            Some(prompt) => Some(prompt),
            None => Some(DEFAULT_SYSTEM_PROMPT),
        }
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tool_timeout_secs
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS)
                .max(1),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        )
    }

    pub fn builtin_tools_enabled(&self) -> bool {
        self.builtin_tools.unwrap_or(true)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Explicit log file, or `astrid.log` in the platform data directory.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| Self::data_dir().map(|dir| dir.join(LOG_FILE_NAME)))
    }

    pub fn turn_options(&self) -> TurnOptions {
        TurnOptions {
            max_tool_rounds: self.max_tool_rounds(),
            tool_timeout: self.tool_timeout(),
        }
    }

    /// A config with every scalar default written out, for `config init`.
    pub fn scaffold() -> Self {
        Config {
            model: Some(DEFAULT_MODEL.to_string()),
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            assistant_name: Some(DEFAULT_ASSISTANT_NAME.to_string()),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tool_rounds: Some(DEFAULT_MAX_TOOL_ROUNDS),
            tool_timeout_secs: Some(DEFAULT_TOOL_TIMEOUT_SECS),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            builtin_tools: Some(true),
            log_file: None,
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
            mcp_servers: Vec::new(),
        }
    }
}
