//! Fast CLI tests using assert_cmd.
//! These test the binary directly without needing a container engine.

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const VALID: &str = r#"
services:
  web:
    image: nginx:1.25
    ports: ["8080:80"]
    depends_on: [api]
  api:
    image: shop/api:2
"#;

fn dockhand() -> Command {
    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    // keep tests away from the user's config
    cmd.env("XDG_CONFIG_HOME", std::env::temp_dir().join("dockhand-cli-tests"));
    cmd
}

fn definition(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_help_flag() {
    dockhand()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Container control plane"));
}

#[test]
fn test_version_flag() {
    dockhand()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_subcommand_help() {
    for subcmd in ["ps", "inspect", "op", "prune", "logs", "network", "volume", "compose"] {
        dockhand()
            .args([subcmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    dockhand().arg("nonexistent-subcommand").assert().failure();
}

#[test]
fn test_unknown_operation_rejected_by_parser() {
    dockhand()
        .args(["op", "explode", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("explode"));
}

#[test]
fn test_unknown_prune_kind_rejected_by_parser() {
    dockhand()
        .args(["prune", "everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown prune type"));
}

#[test]
fn test_label_must_be_key_value() {
    dockhand()
        .args(["network", "create", "front", "--label", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=value"));
}

#[test]
fn test_compose_test_valid_definition() {
    let file = definition(VALID);
    dockhand()
        .args(["compose", "test"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 service(s)"))
        .stdout(predicate::str::contains("api -> web"));
}

#[test]
fn test_compose_test_json_output() {
    let file = definition(VALID);
    dockhand()
        .args(["--json", "compose", "test"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"services\""));
}

#[test]
fn test_compose_test_invalid_definition() {
    let file = definition("services:\n  web:\n    ports: [\"80:80\"]\n");
    dockhand()
        .args(["compose", "test"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid compose definition"))
        .stderr(predicate::str::contains("no image"));
}

#[test]
fn test_compose_test_reads_stdin() {
    dockhand()
        .args(["compose", "test", "-"])
        .write_stdin(VALID)
        .assert()
        .success();
}

#[test]
fn test_compose_test_missing_file() {
    dockhand()
        .args(["compose", "test", "/nonexistent/docker-compose.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_config_shows_sections() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[operations]\ncall_timeout_secs = 7\n").unwrap();

    dockhand()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[engine]"))
        .stdout(predicate::str::contains("call_timeout_secs = 7"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[operations\n").unwrap();

    dockhand()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure();
}
