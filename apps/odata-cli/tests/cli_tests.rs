#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end runs of the `odata` binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::NamedTempFile;

fn odata(args: &[&str], stdin: &str) -> Output {
    odata_with_env(args, stdin, &[])
}

fn odata_with_env(args: &[&str], stdin: &str, env: &[(&str, &str)]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_odata"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("ODATA_API_PREFIX")
        .env_remove("ODATA_LOG_LEVEL")
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("binary should start");
    // the binary may exit before reading stdin
    if let Err(err) = child.stdin.take().unwrap().write_all(stdin.as_bytes()) {
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn file_with(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_compile_from_stdin() {
    let output = odata(
        &["compile"],
        r#"{ "resource": "pilot", "options": { "$filter": { "name": "x" }, "$top": 5 } }"#,
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "pilot?$filter=name eq 'x'&$top=5");
}

#[test]
fn test_compile_from_file_with_prefix_flag() {
    let input = file_with(r#"{ "resource": "pilot", "id": 1 }"#, ".json");
    let output = odata(
        &["compile", "--input", input.path().to_str().unwrap(), "--api-prefix", "/resin/"],
        "",
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "/resin/pilot(1)");
}

#[test]
fn test_prefix_from_config_file_and_env() {
    let config = file_with("api_prefix: /from-file/\n", ".yaml");
    let path = config.path().to_str().unwrap();

    let output = odata(&["--config", path, "compile"], r#"{ "resource": "a" }"#);
    assert_eq!(stdout(&output), "/from-file/a");

    let output = odata_with_env(
        &["--config", path, "compile", "--input", "-"],
        r#"{ "resource": "a" }"#,
        &[("ODATA_API_PREFIX", "/from-env/")],
    );
    assert_eq!(stdout(&output), "/from-env/a");
}

#[test]
fn test_missing_config_file_fails() {
    let output = odata(&["--config", "/nonexistent/odata.yaml", "compile"], "{}");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("config file not found"));
}

#[test]
fn test_compile_errors_exit_with_failure() {
    let output = odata(&["compile"], r#"{ "options": {} }"#);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(
        stderr(&output).contains("Either the url or resource must be specified."),
        "{}",
        stderr(&output)
    );
}

#[test]
fn test_auth_string() {
    let output = odata(
        &["auth"],
        r#"{ "modelName": "resin", "resource": "actor", "access": "delete",
             "options": { "$filter": { "id": { "@": "__ACTOR_ID" } } } }"#,
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "resin.actor.delete?id eq @__ACTOR_ID");
}

#[test]
fn test_deprecations_are_logged_to_stderr() {
    let output = odata(&["compile"], r#"{ "url": "a?$top=1" }"#);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "a?$top=1");
    assert!(stderr(&output).contains("`url` is deprecated"), "{}", stderr(&output));
}

#[test]
fn test_debug_level_logs_configuration_and_input() {
    let output = odata_with_env(
        &["compile"],
        r#"{ "resource": "a" }"#,
        &[("ODATA_LOG_LEVEL", "debug")],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "a");
    let logs = stderr(&output);
    assert!(logs.contains("Configuration loaded"), "{logs}");
    assert!(logs.contains("Reading query description from stdin"), "{logs}");
}
