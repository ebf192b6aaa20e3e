use crate::core::config::data::Config;

fn unset_or<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(unset)".to_string())
}

impl Config {
    /// Effective settings as printable lines, defaults filled in.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Current configuration:".to_string(),
            format!("  model: {}", self.model()),
            format!("  base-url: {}", unset_or(self.base_url.as_deref())),
            format!("  api-key-env: {}", self.api_key_env()),
            format!("  assistant-name: {}", self.assistant_name()),
            format!(
                "  system-prompt: {}",
                self.system_prompt().unwrap_or("(none)")
            ),
            format!("  max-tool-rounds: {}", self.max_tool_rounds()),
            format!("  tool-timeout: {}s", self.tool_timeout().as_secs()),
            format!("  request-timeout: {}s", self.request_timeout().as_secs()),
            format!(
                "  builtin-tools: {}",
                if self.builtin_tools_enabled() { "on" } else { "off" }
            ),
            format!(
                "  log-file: {}",
                unset_or(self.log_file().map(|p| p.display().to_string()))
            ),
            format!("  log-level: {}", self.log_level()),
        ];

        if self.mcp_servers.is_empty() {
            lines.push("  mcp-servers: (none set)".to_string());
        } else {
            lines.push("  mcp-servers:".to_string());
            for server in &self.mcp_servers {
                let state = if server.is_enabled() { "" } else { " [disabled]" };
                lines.push(format!(
                    "    {} ({}): {}{}",
                    server.id,
                    server.display_name(),
                    server.command,
                    state
                ));
            }
        }
        lines
    }

    pub fn print_all(&self) {
        for line in self.summary_lines() {
            println!("{line}");
        }
    }
}
