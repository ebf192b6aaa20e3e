use super::{CommandContext, CommandResult};

pub type CommandHandler = fn(&mut CommandContext<'_>, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Commands whose names start with `prefix`, for completion hints.
pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.trim_start_matches('/').to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        help: "Show available commands and key bindings.",
        handler: super::handle_help,
    },
    Command {
        name: "clear",
        help: "Start a new conversation, keeping the system prompt.",
        handler: super::handle_clear,
    },
    Command {
        name: "tools",
        help: "List the tools the assistant can call.",
        handler: super::handle_tools,
    },
    Command {
        name: "config",
        help: "Show the effective configuration.",
        handler: super::handle_config,
    },
    Command {
        name: "exit",
        help: "Quit Astrid.",
        handler: super::handle_exit,
    },
    Command {
        name: "quit",
        help: "Quit Astrid.",
        handler: super::handle_exit,
    },
];
