//! CLI tests

use clap::{CommandFactory, Parser};
use serde_json::json;

use crate::{Cli, Commands, ConfigAction, OutputFormat, parse_context, read_replay_log};

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_route_args() {
    let cli = Cli::try_parse_from([
        "switchboard",
        "route",
        "Any put buying in SPY?",
        "--context",
        "ticker=SPY",
        "-c",
        "size=3",
        "--deadline-ms",
        "250",
        "--format",
        "json",
    ])
    .unwrap();

    assert_eq!(cli.format, OutputFormat::Json);
    match cli.command {
        Commands::Route {
            prompt,
            context,
            deadline_ms,
        } => {
            assert_eq!(prompt, "Any put buying in SPY?");
            assert_eq!(context, vec!["ticker=SPY", "size=3"]);
            assert_eq!(deadline_ms, Some(250));
        }
        _ => panic!("expected route command"),
    }
}

#[test]
fn test_config_set_args() {
    let cli = Cli::try_parse_from([
        "switchboard",
        "-q",
        "config",
        "set",
        "adaptive.exploration_rate",
        "0.2",
    ])
    .unwrap();

    assert!(cli.quiet);
    assert!(matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Set { .. }
        }
    ));
}

#[test]
fn test_unknown_format_rejected() {
    assert!(Cli::try_parse_from(["switchboard", "profiles", "--format", "yaml"]).is_err());
}

#[test]
fn test_parse_context_values() {
    let context = parse_context(&[
        "ticker=SPY".to_string(),
        "size=3".to_string(),
        "urgent=true".to_string(),
        "note=a=b".to_string(),
    ])
    .unwrap()
    .unwrap();

    assert_eq!(context["ticker"], json!("SPY"));
    assert_eq!(context["size"], json!(3));
    assert_eq!(context["urgent"], json!(true));
    assert_eq!(context["note"], json!("a=b"));
}

#[test]
fn test_parse_context_errors() {
    assert!(parse_context(&[]).unwrap().is_none());
    assert!(parse_context(&["no-separator".to_string()]).is_err());
    assert!(parse_context(&["=value".to_string()]).is_err());
}

#[test]
fn test_read_replay_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    std::fs::write(
        &path,
        "{\"prompt\": \"Show VIX\", \"success\": false, \"response_time\": 2.5}\n\
         \n\
         {\"prompt\": \"Size my position\"}\n",
    )
    .unwrap();

    let entries = read_replay_log(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].success);
    assert_eq!(entries[0].response_time, 2.5);
    assert!(entries[1].success);
    assert_eq!(entries[1].response_time, 0.0);
    assert!(entries[1].context.is_none());
}

#[test]
fn test_read_replay_log_reports_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    std::fs::write(&path, "{\"prompt\": \"ok\"}\n{\"success\": true}\n").unwrap();

    let err = read_replay_log(&path).unwrap_err();
    assert!(err.to_string().contains("line 2"));
}
