//! CLI integration tests

use std::process::Command;

fn run(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "scanctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Price Scanner"), "Should show app name");
    for command in ["status", "result", "pause", "resume", "labels", "get", "set", "reset"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("scanctl"), "Should show binary name");
}

/// Test set subcommand help
#[test]
fn test_set_help() {
    let output = run(&["set", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Set help should succeed");
    assert!(stdout.contains("--name"), "Should show name option");
    assert!(stdout.contains("--price"), "Should show price option");
    assert!(stdout.contains("--category"), "Should show category option");
}

/// Test that set requires a price
#[test]
fn test_set_requires_price() {
    let output = run(&["set", "Class 1", "--name", "Generic Item"]);

    assert!(!output.status.success(), "Set without a price should fail");
}

/// Test invalid command
#[test]
fn test_invalid_command() {
    let output = run(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
}
