use std::process::Command;

use remedy_common::testing::init_test_logging;
use tempfile::TempDir;

fn remedyd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_remedyd"));
    cmd.env_remove("REMEDY_CONFIG");
    cmd
}

#[test]
fn test_help_includes_usage() {
    init_test_logging();

    let output = remedyd().arg("--help").output().expect("Failed to run remedyd --help");

    assert!(output.status.success(), "remedyd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("remedyd"), "Expected usage, got: {stdout}");
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--once"));
}

#[test]
fn test_version() {
    let output = remedyd().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = remedyd()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--check-config")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.toml"), "stderr: {stderr}");
    assert!(stderr.contains("REM-E001"), "stderr: {stderr}");
    assert!(stderr.contains("Check the path passed to --config"), "stderr: {stderr}");
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remedy.toml");
    std::fs::write(&path, "[actuation]\nbatch_threshold = 0\n").unwrap();

    let output = remedyd()
        .arg("--config")
        .arg(&path)
        .arg("--check-config")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("actuation.batch_threshold"), "stderr: {stderr}");
    assert!(stderr.contains("REM-E004"), "stderr: {stderr}");
}

#[test]
fn test_check_config_accepts_defaults() {
    let output = remedyd().arg("--check-config").output().unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration OK"));
}

#[test]
fn test_unreadable_credentials_are_reported_with_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remedy.toml");
    let missing = dir.path().join("missing-credentials");
    std::fs::write(
        &path,
        format!("[oracle]\ncredentials_file = \"{}\"\n", missing.display()),
    )
    .unwrap();

    let output = remedyd()
        .arg("--config")
        .arg(&path)
        .arg("--once")
        .arg("--dry-run")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("REM-E006"), "stderr: {stderr}");
    assert!(stderr.contains("missing-credentials"), "stderr: {stderr}");
}
