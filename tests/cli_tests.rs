#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::apps::HELLO_SPEC;
use common::temp_files::{cleanup_temp_files, create_temp_spec, create_temp_yaml};
use std::process::Command;

fn brrtguard() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_brrtguard"));
    cmd.env("BRRTGUARD_LOG_LEVEL", "error")
        .env("BRRTGUARD_LOG_FORMAT", "pretty")
        .env_remove("BRRTGUARD_RESPONSES_CONFIG");
    cmd
}

#[test]
fn test_cli_check_valid_spec() {
    let spec = create_temp_yaml(HELLO_SPEC);
    let output = brrtguard().args(["check", "--spec"]).arg(&spec).output().unwrap();
    cleanup_temp_files(&[spec]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("OK: Hello API (3.0), 1 operations"), "{stdout}");
}

#[test]
fn test_cli_check_reports_missing_responses() {
    let spec = create_temp_yaml(HELLO_SPEC);
    let config = create_temp_spec("required_responses:\n  get: [200, 404]\n", "yaml");
    let output = brrtguard()
        .args(["check", "--spec"])
        .arg(&spec)
        .arg("--responses-config")
        .arg(&config)
        .output()
        .unwrap();
    cleanup_temp_files(&[spec, config]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ERROR missing response '404' for 'get' request on path '/hello'"),
        "{stderr}"
    );
}

#[test]
fn test_cli_routes_lists_operations() {
    let spec = create_temp_yaml(HELLO_SPEC);
    let output = brrtguard().args(["routes", "-s"]).arg(&spec).output().unwrap();
    cleanup_temp_files(&[spec]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "GET /hello hello\n");
}

#[test]
fn test_cli_invalid_spec_fails() {
    let spec = create_temp_yaml("openapi: \"2.0\"\ninfo: {title: t, version: \"1\"}\npaths: {}\n");
    let output = brrtguard().args(["check", "--spec"]).arg(&spec).output().unwrap();
    cleanup_temp_files(&[spec]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("UnsupportedVersion"));
}
