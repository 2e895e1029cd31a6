//! CLI integration tests for the tether command-line interface.
//!
//! These run the binary against temporary config files; none of them needs
//! a live MCP server.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Get a command for the tether binary.
fn tether() -> Command {
    let mut cmd = Command::cargo_bin("tether").unwrap();
    cmd.env_remove("TETHER_CONFIG").env_remove("TETHER_LOG_DIR");
    cmd
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const CONFIG: &str = r#"
[client]
request_timeout_secs = 2

[[servers]]
id = "good"
name = "Good"
command = "mcp-server-good"

[[servers]]
id = "bad-url"
name = "BadUrl"
transport = "websocket"
url = "http://localhost:9000"

[[servers]]
id = "ghost"
name = "Ghost"
command = "nonexistent-mcp-server-12345"
enabled = false
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Help
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    tether()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("resources"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("read"));
}

#[test]
fn test_version_displays() {
    tether()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config-only commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_list_table() {
    let file = config_file(CONFIG);
    tether()
        .arg("--config")
        .arg(file.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Good"))
        .stdout(predicate::str::contains("invalid"))
        .stdout(predicate::str::contains("Ghost").not());
}

#[test]
fn test_list_json_includes_disabled_with_all() {
    let file = config_file(CONFIG);
    let output = tether()
        .arg("--config")
        .arg(file.path())
        .args(["--json", "list", "--all"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let servers: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let servers = servers.as_array().unwrap();
    assert_eq!(servers.len(), 3);
    assert_eq!(servers[1]["id"], "bad-url");
    assert!(servers[1]["invalid"].as_str().unwrap().contains("scheme"));
    assert_eq!(servers[2]["enabled"], false);
}

#[test]
fn test_validate_reports_invalid_servers() {
    let file = config_file(CONFIG);
    tether()
        .arg("--config")
        .arg(file.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("✓ Good"))
        .stdout(predicate::str::contains("✗ BadUrl"))
        .stderr(predicate::str::contains("1 of 3"));

    tether()
        .arg("--config")
        .arg(file.path())
        .args(["validate", "good"])
        .assert()
        .success();
}

#[test]
fn test_unknown_server() {
    let file = config_file(CONFIG);
    tether()
        .arg("--config")
        .arg(file.path())
        .args(["test", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no server named 'nope'"));
}

#[test]
fn test_connection_failure_is_explained() {
    let file = config_file(CONFIG);
    tether()
        .arg("--config")
        .arg(file.path())
        .args(["test", "Ghost"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("was not found"));
}

#[test]
fn test_call_rejects_non_object_args() {
    let file = config_file(CONFIG);
    tether()
        .arg("--config")
        .arg(file.path())
        .args(["call", "echo", "--args", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn test_missing_config_file() {
    tether()
        .args(["--config", "/nonexistent/tether/servers.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}
