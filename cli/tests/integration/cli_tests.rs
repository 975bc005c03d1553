//! Integration tests for the infracheck CLI skeleton: help, version and
//! argument parsing.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn infracheck() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("infracheck"));
    cmd.env("NO_COLOR", "1");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    // clap with arg_required_else_help shows help on stderr and exits 2, but
    // only when no argument arrives from the environment either.
    infracheck()
        .env_remove("NO_COLOR")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Provision infrastructure modules"));
}

#[test]
fn test_cli_accepts_conventional_no_color_values() {
    for value in ["1", "true", "yes"] {
        infracheck()
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }
}

#[test]
fn test_cli_help_flag_lists_commands() {
    infracheck()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    infracheck()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("infracheck"));
}

#[test]
fn test_version_command_shows_version() {
    infracheck()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "infracheck {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let output = infracheck()
        .args(["version", "--json"])
        .output()
        .expect("run infracheck");

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// --- Argument parsing ---

#[test]
fn test_run_requires_suite_argument() {
    infracheck()
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("<SUITE>"));
}

#[test]
fn test_run_help_documents_keep_flag() {
    infracheck()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--keep"))
        .stdout(predicate::str::contains("--case"))
        .stdout(predicate::str::contains("--sequential"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    infracheck()
        .arg("plan")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
