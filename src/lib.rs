//! Astrid is a terminal chat client whose assistant can call tools while it
//! answers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation model, the streaming model client, the
//!   tool registry, and the turn orchestrator that alternates between model
//!   output and tool execution until the model produces a final answer.
//! - [`ui`] renders the terminal interface and runs the interactive event loop
//!   that drives user input and display updates.
//! - [`commands`] implements slash-command parsing and execution used by the
//!   chat loop.
//! - [`mcp`] connects to Model Context Protocol servers over stdio and exposes
//!   their tools through the registry.
//! - [`api`] defines the OpenAI-compatible chat payloads.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which loads configuration, installs
//! [`logging`], and dispatches into [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod logging;
pub mod mcp;
pub mod ui;
pub mod utils;
