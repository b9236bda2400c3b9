//! CLI tests for `execkit run`, `execkit init` and `execkit check`.
//!
//! Spawns the execkit binary and verifies exit codes match the launch outcome.

use std::process::Command;

use execkit::exit_codes;
use execkit::io::config::{LauncherConfig, StdoutMode, load_config};
use execkit::io::exit_watch::{ExitWatch, Pidfd};
use execkit::test_support::temp_config;

fn execkit() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_execkit"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn run_success_exits_ok() {
    let status = execkit()
        .args(["run", "--", "/bin/sh", "-c", "exit 0"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn run_failure_exits_failed_and_explains() {
    let output = execkit()
        .args(["run", "--", "/bin/sh", "-c", "echo nope >&2; exit 5"])
        .output()
        .expect("execkit run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exited with status 5"), "{stderr}");
    assert!(stderr.contains("nope"), "{stderr}");
}

#[test]
fn run_missing_program_exits_launch_error() {
    let status = execkit()
        .args(["run", "--", "/nonexistent/program"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::LAUNCH_ERROR));
}

#[test]
fn run_timeout_exits_timed_out() {
    if !Pidfd.is_available() {
        return;
    }
    let status = execkit()
        .args(["run", "--timeout", "1", "--", "/bin/sleep", "5"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::TIMED_OUT));
}

#[test]
fn config_default_timeout_applies() {
    if !Pidfd.is_available() {
        return;
    }
    let (_dir, path) = temp_config("default_timeout_secs = 1\n");
    let status = execkit()
        .arg("run")
        .arg("--config")
        .arg(&path)
        .args(["--", "/bin/sleep", "5"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::TIMED_OUT));
}

#[test]
fn invalid_config_exits_invalid() {
    let (_dir, path) = temp_config("stderr_limit_bytes = 0\n");
    let status = execkit()
        .arg("run")
        .arg("--config")
        .arg(&path)
        .args(["--", "/bin/true"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn json_summary_reports_outcome() {
    let output = execkit()
        .args(["run", "--json", "--", "/bin/sh", "-c", "exit 3"])
        .output()
        .expect("execkit run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(summary["exit_code"], 3);
    assert_eq!(summary["result"]["outcome"], "failure");
    assert_eq!(summary["result"]["exit"]["kind"], "code");
}

#[test]
fn huge_timeout_does_not_overflow() {
    if !Pidfd.is_available() {
        return;
    }
    let status = execkit()
        .args(["run", "--timeout", "18446744073709551615", "--", "/bin/true"])
        .status()
        .expect("execkit run");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn init_writes_loadable_defaults_and_refuses_overwrite() {
    let (_dir, existing) = temp_config("stdout = \"null\"\n");
    let status = execkit()
        .arg("init")
        .arg("--config")
        .arg(&existing)
        .status()
        .expect("execkit init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert_eq!(load_config(&existing).expect("load").stdout, StdoutMode::Null);

    let status = execkit()
        .args(["init", "--force", "--config"])
        .arg(&existing)
        .status()
        .expect("execkit init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&existing).expect("load"), LauncherConfig::default());

    let fresh = existing.with_file_name("fresh.toml");
    let status = execkit()
        .arg("init")
        .arg("--config")
        .arg(&fresh)
        .status()
        .expect("execkit init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&fresh).expect("load"), LauncherConfig::default());
}

#[test]
fn check_reports_mechanism() {
    let output = execkit().arg("check").output().expect("execkit check");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("pidfd: "), "{stdout}");
}
