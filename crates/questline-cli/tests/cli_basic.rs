//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory and
//! checks the JSON it prints.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_questline-cli"))
        .args(args)
        .env("QUESTLINE_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout is not JSON")
}

#[test]
fn test_fresh_quest_status() {
    let dir = TempDir::new().unwrap();
    let status = run_json(dir.path(), &["quest", "status"]);

    assert_eq!(status["current_quest"], 1);
    assert_eq!(status["completed"], 0);
    assert_eq!(status["quests"][0]["status"], "available");
    assert_eq!(status["quests"][1]["status"], "locked");
}

#[test]
fn test_quest_complete_persists() {
    let dir = TempDir::new().unwrap();
    let result = run_json(dir.path(), &["quest", "complete", "1", "--xp", "100"]);
    assert_eq!(result["report"]["quest"]["outcome"], "completed");
    assert_eq!(result["report"]["quest"]["next_unlocked"], 2);

    let quest = run_json(dir.path(), &["quest", "status", "2"]);
    assert_eq!(quest["status"], "available");

    // 100 for the quest and 50 for first_steps.
    let xp = run_json(dir.path(), &["xp", "show"]);
    assert_eq!(xp["total_xp"], 150);
    assert_eq!(xp["level"], 2);

    let again = run_json(dir.path(), &["quest", "complete", "1"]);
    assert_eq!(again["report"]["quest"]["outcome"], "already_completed");
    assert_eq!(again["report"]["xp_awarded"], 0);
}

#[test]
fn test_locked_quest_rejected() {
    let dir = TempDir::new().unwrap();
    let result = run_json(dir.path(), &["quest", "complete", "3"]);
    assert_eq!(result["report"]["quest"]["outcome"], "rejected");
    assert_eq!(result["report"]["quest"]["reason"], "locked");
    assert_eq!(result["report"]["total_xp"], 0);
}

#[test]
fn test_event_with_context_unlocks_archetype() {
    let dir = TempDir::new().unwrap();
    let result = run_json(
        dir.path(),
        &["event", "archetype_complete", "--context", "archetype=builder"],
    );
    let ids: Vec<&str> = result["report"]["unlocked"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["achievement"]["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"archetype_builder"));

    let unlocked = run_json(dir.path(), &["achievements", "list", "--unlocked"]);
    assert!(unlocked
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["id"] == "archetype_builder"));
}

#[test]
fn test_event_replay_ignored() {
    let dir = TempDir::new().unwrap();
    let args = ["event", "hackathon_join", "--xp", "20", "--reference", "hack-1"];
    let first = run_json(dir.path(), &args);
    assert_eq!(first["report"]["replay"], false);

    let second = run_json(dir.path(), &args);
    assert_eq!(second["report"]["replay"], true);
    assert_eq!(second["report"]["xp_awarded"], 0);
}

#[test]
fn test_xp_award_and_history() {
    let dir = TempDir::new().unwrap();
    run_json(dir.path(), &["xp", "award", "30", "--description", "bonus"]);
    let history = run_json(dir.path(), &["xp", "history"]);
    assert_eq!(history[0]["amount"], 30);
    assert_eq!(history[0]["source"], "manual");
    assert_eq!(history[0]["description"], "bonus");
}

#[test]
fn test_config_get_set() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "profile.user_id"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "local");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "outbox.max_attempts", "3"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "outbox.max_attempts"]);
    assert_eq!(stdout.trim(), "3");

    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "outbox.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_sync_status_empty_after_commands() {
    let dir = TempDir::new().unwrap();
    run_json(dir.path(), &["quest", "complete", "1"]);
    let status = run_json(dir.path(), &["sync", "status"]);
    assert_eq!(status["pending"], 0);
    assert_eq!(status["dead_letters"], 0);
}

#[test]
fn test_unknown_quest_status_fails() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["quest", "status", "42"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("does not exist"));
}
