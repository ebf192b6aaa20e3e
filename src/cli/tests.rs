use super::*;
use std::path::Path;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }
}

use test_helpers::parse_args;

#[test]
fn no_subcommand_means_chat() {
    let args = parse_args(&["astrid"]);
    assert!(args.command.is_none());
    assert!(args.model.is_none());
}

#[test]
fn global_flags_parse_before_and_after_subcommand() {
    let args = parse_args(&["astrid", "-m", "mock", "chat", "--max-tool-rounds", "3"]);
    assert!(matches!(args.command, Some(Commands::Chat)));
    assert_eq!(args.model.as_deref(), Some("mock"));
    assert_eq!(args.max_tool_rounds, Some(3));

    let args = parse_args(&[
        "astrid",
        "tools",
        "--config",
        "/tmp/astrid.toml",
        "-l",
        "/tmp/astrid.log",
    ]);
    assert!(matches!(args.command, Some(Commands::Tools)));
    assert_eq!(args.config.as_deref(), Some(Path::new("/tmp/astrid.toml")));
    assert_eq!(args.log.as_deref(), Some(Path::new("/tmp/astrid.log")));
}

#[test]
fn say_collects_the_whole_prompt() {
    let args = parse_args(&["astrid", "say", "what", "is", "-3", "squared?"]);
    match args.command {
        Some(Commands::Say { prompt }) => {
            assert_eq!(prompt, vec!["what", "is", "-3", "squared?"]);
        }
        _ => panic!("expected say"),
    }
}

#[test]
fn config_subcommands_parse() {
    let args = parse_args(&["astrid", "config", "init", "--force"]);
    assert!(matches!(
        args.command,
        Some(Commands::Config {
            action: ConfigCommand::Init { force: true }
        })
    ));

    let args = parse_args(&["astrid", "config", "path"]);
    assert!(matches!(
        args.command,
        Some(Commands::Config {
            action: ConfigCommand::Path
        })
    ));

    assert!(Args::try_parse_from(["astrid", "config"]).is_err());
}

#[test]
fn overrides_replace_file_values() {
    let mut config = Config {
        model: Some("gpt-4o".to_string()),
        base_url: Some("https://file.example/v1".to_string()),
        max_tool_rounds: Some(4),
        ..Default::default()
    };
    let args = parse_args(&[
        "astrid",
        "-m",
        "mock",
        "--base-url",
        "http://localhost:8080/v1",
        "--max-tool-rounds",
        "2",
    ]);
    args.apply_overrides(&mut config);

    assert_eq!(config.model(), "mock");
    assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080/v1"));
    assert_eq!(config.max_tool_rounds(), 2);
}

#[test]
fn absent_flags_leave_config_alone() {
    let mut config = Config {
        model: Some("gpt-4o".to_string()),
        log_file: Some("/var/log/astrid.log".into()),
        ..Default::default()
    };
    let before = config.clone();
    parse_args(&["astrid"]).apply_overrides(&mut config);
    assert_eq!(config, before);
}

#[test]
fn blank_model_flag_is_ignored() {
    let mut config = Config::default();
    parse_args(&["astrid", "-m", " "]).apply_overrides(&mut config);
    assert!(config.model.is_none());
}
