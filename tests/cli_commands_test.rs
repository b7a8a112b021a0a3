// Integration tests for CLI commands
// Run with: cargo test --test cli_commands_test

use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Command for the built binary with an isolated config directory.
fn pushline(config_dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pushline"));
    cmd.env("PUSHLINE_CONFIG_DIR", config_dir.path())
        .env_remove("PUSHLINE_APP_ID")
        .env_remove("PUSHLINE_API_KEY")
        .env_remove("PUSHLINE_BASE_URL")
        .env("RUST_LOG", "error");
    cmd
}

/// Test the status command without any configuration
#[test]
fn test_status_without_config() {
    let temp_dir = TempDir::new().unwrap();

    let output = pushline(&temp_dir)
        .arg("status")
        .output()
        .expect("Failed to execute status command");

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not configured"), "stdout: {stdout}");
    assert!(stdout.contains("Stored device: none"), "stdout: {stdout}");
}

/// Test that register fails cleanly without credentials
#[test]
fn test_register_requires_credentials() {
    let temp_dir = TempDir::new().unwrap();

    let output = pushline(&temp_dir)
        .arg("register")
        .output()
        .expect("Failed to execute register command");

    assert!(!output.status.success(), "Command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("app_id"), "stderr: {stderr}");
}

/// Test that listen deduplicates payloads read from stdin
#[test]
fn test_listen_deduplicates_stdin_payloads() {
    let temp_dir = TempDir::new().unwrap();

    let mut child = pushline(&temp_dir)
        .arg("listen")
        .env("PUSHLINE_APP_ID", "app1")
        .env("PUSHLINE_API_KEY", "key1")
        .env("PUSHLINE_BASE_URL", "http://127.0.0.1:9/api/v1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn listen command");

    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{{"title": "Hello", "dedupKey": "k1"}}"#).unwrap();
        writeln!(stdin, r#"{{"title": "Hello", "dedupKey": "k1"}}"#).unwrap();
        writeln!(stdin, "not json").unwrap();
        writeln!(stdin, r#"{{"aps": {{"alert": {{"title": "Other"}}}}}}"#).unwrap();
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "Command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("received ").count(), 2, "stdout: {stdout}");
    assert_eq!(stdout.matches("duplicate ").count(), 1, "stdout: {stdout}");
    assert!(stdout.contains("invalid JSON"), "stdout: {stdout}");
    assert!(
        stdout.contains("3 received, 1 duplicates, 2 in history"),
        "stdout: {stdout}"
    );
}

/// Test that forget removes the stored identity file
#[test]
fn test_forget_clears_stored_identity() {
    let temp_dir = TempDir::new().unwrap();
    let identity_path = temp_dir.path().join("identity.json");
    std::fs::write(
        &identity_path,
        r#"{
  "app_id": "app1",
  "base_url": "https://push.example/api/v1",
  "identity": {"device_token": "tok-123456789", "device_id": "d-42"},
  "saved_at": "2026-01-01T00:00:00Z"
}"#,
    )
    .unwrap();

    let output = pushline(&temp_dir)
        .arg("forget")
        .output()
        .expect("Failed to execute forget command");

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Forgetting device d-42"), "stdout: {stdout}");
    assert!(!identity_path.exists());

    let again = pushline(&temp_dir).arg("forget").output().unwrap();
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("Stored device: none"));
}
