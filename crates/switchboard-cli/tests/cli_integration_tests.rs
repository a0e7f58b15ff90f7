//! CLI integration tests for switchboard
//!
//! Tests the switchboard CLI commands end-to-end using assert_cmd. Every test
//! gets its own config directory, and none of them needs an embedding service.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Helper to create a command isolated in `dir`
#[allow(deprecated)]
fn switchboard_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("switchboard").unwrap();
    cmd.current_dir(dir.path());
    cmd.env("SWITCHBOARD_CONFIG_DIR", dir.path().join("config"));
    cmd.env("OLLAMA_HOST", "http://127.0.0.1:9");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn set_config(dir: &TempDir, key: &str, value: &str) {
    switchboard_cmd(dir)
        .args(["config", "set", key, value])
        .assert()
        .success();
}

/// Config that routes without embeddings
fn offline_router(dir: &TempDir) {
    set_config(dir, "adaptive.strategies", "performance:1.0");
    set_config(dir, "adaptive.exploration_rate", "0");
}

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("profiles"));
}

#[test]
fn test_version_output() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("switchboard"));
}

#[test]
fn test_config_path_uses_override() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().join("config").to_string_lossy().as_ref(),
        ));
}

#[test]
fn test_config_set_get_reset() {
    let dir = TempDir::new().unwrap();

    switchboard_cmd(&dir)
        .args(["config", "set", "vector.similarity_threshold", "0.65"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set vector.similarity_threshold = 0.65"));

    switchboard_cmd(&dir)
        .args(["config", "get", "vector.similarity_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::diff("0.65\n"));

    assert!(dir.path().join("config").join("config.toml").exists());

    switchboard_cmd(&dir)
        .args(["config", "reset"])
        .assert()
        .success();

    switchboard_cmd(&dir)
        .args(["config", "get", "vector.similarity_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::diff("0.5\n"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .args(["config", "set", "adaptive.exploration_rate", "2.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exploration_rate"));

    assert!(!dir.path().join("config").join("config.toml").exists());
}

#[test]
fn test_config_list() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("embedding.model = nomic-embed-text"))
        .stdout(predicate::str::contains(
            "adaptive.strategies = vector:0.7,performance:0.3",
        ));
}

#[test]
fn test_config_get_unknown_key() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .args(["config", "get", "routing.magic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_profiles_command() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("options_flow"))
        .stdout(predicate::str::contains("Keywords:"));
}

#[test]
fn test_profiles_json() {
    let dir = TempDir::new().unwrap();
    let output = switchboard_cmd(&dir)
        .args(["profiles", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let profiles: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(profiles.as_array().unwrap().len(), 8);
    assert_eq!(profiles[0]["expert"], "market_regime");
}

#[test]
fn test_route_with_fallback_strategy() {
    let dir = TempDir::new().unwrap();
    set_config(&dir, "adaptive.strategies", "fallback:1.0");
    set_config(&dir, "adaptive.fallback_expert", "risk");
    set_config(&dir, "adaptive.exploration_rate", "0");

    switchboard_cmd(&dir)
        .args(["-q", "route", "How big should my position be?"])
        .assert()
        .success()
        .stdout(predicate::str::diff("risk\n"));
}

#[test]
fn test_route_json_output() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    let output = switchboard_cmd(&dir)
        .args([
            "route",
            "What's the current market regime?",
            "--context",
            "ticker=SPY",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let decision: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(decision["strategy_used"], "adaptive");
    assert!(decision["metadata"]["decision_id"].is_string());
    let confidence = decision["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[test]
fn test_route_text_output() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    switchboard_cmd(&dir)
        .args(["route", "Anything at all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Expert:"))
        .stdout(predicate::str::contains("Strategy:   adaptive"))
        .stdout(predicate::str::contains("performance"));
}

#[test]
fn test_route_without_embedding_service_falls_back() {
    let dir = TempDir::new().unwrap();
    set_config(&dir, "adaptive.strategies", "vector:1.0");
    set_config(&dir, "adaptive.exploration_rate", "0");
    set_config(&dir, "embedding.max_retries", "1");
    set_config(&dir, "embedding.timeout_secs", "2");

    switchboard_cmd(&dir)
        .args(["-q", "route", "Is there unusual put buying in SPY?"])
        .assert()
        .success()
        .stdout(predicate::str::diff("orchestrator\n"));
}

#[test]
fn test_route_rejects_bad_context() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    switchboard_cmd(&dir)
        .args(["route", "hello", "--context", "oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn test_replay_command() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    let log = dir.path().join("outcomes.jsonl");
    std::fs::write(
        &log,
        "{\"prompt\": \"Show me unusual options activity\", \"success\": true, \"response_time\": 1.0}\n\
         {\"prompt\": \"What's the VIX doing?\", \"success\": false, \"response_time\": 4.0}\n\
         {\"prompt\": \"Size my position\", \"success\": true, \"response_time\": 0.5}\n",
    )
    .unwrap();

    let output = switchboard_cmd(&dir)
        .args(["replay", log.to_str().unwrap(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["requests"], 3);
    assert_eq!(report["summary"]["successes"], 2);
    assert_eq!(report["state"]["decision_history_size"], 3);

    let stats = report["state"]["strategies"]["performance"]["expert_stats"]
        .as_object()
        .unwrap();
    let total: u64 = stats
        .values()
        .map(|s| s["total_queries"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn test_replay_text_summary() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    let log = dir.path().join("outcomes.jsonl");
    std::fs::write(&log, "{\"prompt\": \"one\"}\n{\"prompt\": \"two\"}\n").unwrap();

    switchboard_cmd(&dir)
        .args(["replay", log.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Replayed 2 requests (2 successful"))
        .stdout(predicate::str::contains("Learned strategy performance:"));
}

#[test]
fn test_replay_missing_file() {
    let dir = TempDir::new().unwrap();
    switchboard_cmd(&dir)
        .args(["replay", "does-not-exist.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read replay file"));
}

#[test]
fn test_state_command() {
    let dir = TempDir::new().unwrap();
    offline_router(&dir);

    let output = switchboard_cmd(&dir).arg("state").output().unwrap();
    assert!(output.status.success());

    let state: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["strategy_name"], "adaptive");
    assert_eq!(state["lifecycle"], "uninitialized");
    assert_eq!(state["strategy_weights"]["performance"], 1.0);
}

#[test]
fn test_doctor_command() {
    let dir = TempDir::new().unwrap();
    set_config(&dir, "embedding.max_retries", "1");

    switchboard_cmd(&dir)
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Configuration: Valid"))
        .stdout(predicate::str::contains("[!!] Embeddings"));
}
