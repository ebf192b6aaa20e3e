//! Slash commands typed into the chat input.
//!
//! Input that does not start with `/`, or names no known command, is sent to
//! the model as a regular message.

mod registry;

pub use registry::{all_commands, matching_commands, CommandInvocation};

use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::tools::ToolRegistry;
use crate::core::turn_guard::TurnRejected;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    ClearScreen,
    Exit,
    ProcessAsMessage(String),
}

/// State a command may read or change. Output lines are shown in the
/// transcript by the caller.
pub struct CommandContext<'a> {
    pub conversation: &'a mut Conversation,
    pub tools: &'a ToolRegistry,
    pub config: &'a Config,
    pub busy: bool,
    pub output: Vec<String>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        conversation: &'a mut Conversation,
        tools: &'a ToolRegistry,
        config: &'a Config,
        busy: bool,
    ) -> Self {
        Self {
            conversation,
            tools,
            config,
            busy,
            output: Vec::new(),
        }
    }

    fn say(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }
}

pub fn process_input(ctx: &mut CommandContext<'_>, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        let invocation = CommandInvocation {
            input: trimmed,
            args,
        };
        (command.handler)(ctx, invocation)
    } else {
        CommandResult::ProcessAsMessage(input.to_string())
    }
}

pub const KEY_HELP: &[(&str, &str)] = &[
    ("Enter", "send the message"),
    ("Esc", "cancel the response in progress"),
    ("Up/Down, PgUp/PgDn", "scroll the conversation"),
    ("Ctrl-C, Ctrl-D", "quit"),
];

pub(super) fn handle_help(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    ctx.say("Commands:");
    for command in all_commands() {
        ctx.say(format!("  /{:<8} {}", command.name, command.help));
    }
    ctx.say("Keys:");
    for (keys, action) in KEY_HELP {
        ctx.say(format!("  {keys}: {action}"));
    }
    CommandResult::Continue
}

pub(super) fn handle_clear(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    if ctx.busy {
        ctx.say(TurnRejected::Busy.to_string());
        return CommandResult::Continue;
    }
    ctx.conversation.clear();
    CommandResult::ClearScreen
}

pub(super) fn handle_tools(
    ctx: &mut CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let filter = invocation.args.to_ascii_lowercase();
    let schemas: Vec<_> = ctx
        .tools
        .list_tools()
        .into_iter()
        .filter(|schema| filter.is_empty() || schema.name.to_ascii_lowercase().contains(&filter))
        .collect();

    if schemas.is_empty() {
        ctx.say("No tools available.");
        return CommandResult::Continue;
    }

    ctx.say("Available tools:");
    for schema in schemas {
        if schema.description.is_empty() {
            ctx.say(format!("  {}", schema.name));
        } else {
            ctx.say(format!("  {}: {}", schema.name, schema.description));
        }
    }
    CommandResult::Continue
}

pub(super) fn handle_config(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let lines = ctx.config.summary_lines();
    ctx.output.extend(lines);
    CommandResult::Continue
}

pub(super) fn handle_exit(
    _ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Exit
}
