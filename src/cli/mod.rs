//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod say;
pub mod setup;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::say::run_say;
use crate::cli::setup::{build_session, build_tool_registry, exit_with_provider_error};
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::ui::chat_loop::{run_chat, ChatSession};

#[derive(Parser)]
#[command(name = "astrid")]
#[command(about = "A terminal chat client whose assistant can call tools")]
#[command(
    long_about = "Astrid is a full-screen terminal chat client for OpenAI-compatible APIs. \
Replies stream in as they are generated, and the assistant can call tools (a calculator, \
a clock, and any configured MCP servers) before answering.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (the variable name is configurable with api_key_env)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  ASTRID_LOG        Log filter, e.g. debug or astrid=trace\n\n\
Controls:\n\
  Enter             Send the message\n\
  Esc               Cancel the response in progress\n\
  Up/Down, PgUp/PgDn  Scroll through the conversation\n\
  Ctrl+C, Ctrl+D    Quit the application\n\n\
Commands:\n\
  /help             Show commands and key bindings\n\
  /clear            Start a new conversation\n\
  /tools            List available tools\n\
  /config           Show the effective configuration\n\
  /exit, /quit      Quit\n\n\
Use the model name 'mock' to try Astrid without an API key."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Maximum tool-call rounds per turn
    #[arg(long, global = true, value_name = "N")]
    pub max_tool_rounds: Option<usize>,

    /// Write diagnostic logs to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send one prompt and print the reply without the full-screen UI
    Say {
        /// The prompt to send (multiple words are joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the tools available to the assistant
    Tools,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
}

impl Args {
    /// Applies command-line overrides on top of the loaded file.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = self.model.as_ref().filter(|m| !m.trim().is_empty()) {
            config.model = Some(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(rounds) = self.max_tool_rounds {
            config.max_tool_rounds = Some(rounds);
        }
        if let Some(log) = &self.log {
            config.log_file = Some(log.clone());
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config_path = Config::resolve_path(args.config.as_deref())?;
    let mut config = match Config::load_from_path(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Config { action } => run_config_command(action, &config, &config_path),
        Commands::Tools => {
            crate::logging::install(config.log_file().as_deref(), config.log_level());
            let (registry, connections) = build_tool_registry(&config).await;
            for status in connections.statuses() {
                eprintln!("{}", status.describe());
            }
            if registry.is_empty() {
                println!("No tools available.");
            }
            for schema in registry.list_tools() {
                println!("{}: {}", schema.name, schema.description);
            }
            Ok(())
        }
        Commands::Say { prompt } => {
            crate::logging::install(config.log_file().as_deref(), config.log_level());
            let session = match build_session(&config).await {
                Ok(session) => session,
                Err(err) => exit_with_provider_error(err),
            };
            for status in session.connections.statuses() {
                eprintln!("{}", status.describe());
            }
            run_say(prompt, session.orchestrator, &config).await
        }
        Commands::Chat => {
            crate::logging::install(config.log_file().as_deref(), config.log_level());
            let session = match build_session(&config).await {
                Ok(session) => session,
                Err(err) => exit_with_provider_error(err),
            };
            let startup_notes = session
                .connections
                .statuses()
                .iter()
                .map(|status| status.describe())
                .collect();
            let conversation = Conversation::new(config.system_prompt().map(str::to_string));
            let result = run_chat(ChatSession {
                config,
                orchestrator: session.orchestrator,
                conversation,
                startup_notes,
            })
            .await;
            drop(session.connections);
            result
        }
    }
}

fn run_config_command(
    action: ConfigCommand,
    config: &Config,
    config_path: &std::path::Path,
) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigCommand::Path => {
            println!("{}", config_path.display());
        }
        ConfigCommand::Show => {
            println!("Config file: {}", path_display(config_path));
            config.print_all();
        }
        ConfigCommand::Init { force } => {
            if config_path.exists() && !force {
                eprintln!(
                    "⚠️  {} already exists; pass --force to overwrite it.",
                    path_display(config_path)
                );
                std::process::exit(1);
            }
            Config::scaffold().save_to_path(config_path)?;
            println!("✅ Wrote {}", path_display(config_path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
