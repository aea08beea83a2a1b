//! Integration tests for the `optwire` CLI binary.
//!
//! Argument parsing, help output and completions run without a backend;
//! dispatch tests point a temp config at a wiremock server.
#![allow(clippy::unwrap_used)]

use std::io::Write as _;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `optwire` binary with env isolation.
fn optwire_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("optwire");
    cmd.env("HOME", "/tmp/optwire-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/optwire-cli-test-nonexistent")
        .env_remove("OPTWIRE_CONFIG")
        .env_remove("OPTWIRE_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn backend_config(uri: &str) -> NamedTempFile {
    write_config(&format!(
        r#"
        [apis.main]
        url = "{uri}/api/"

        [fields.owner]
        api = "main"
        target = "users"
        page_size = 2
        name_source = {{ type = "field", source = "name" }}
        "#
    ))
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(args: Vec<String>) -> std::process::Output {
    tokio::task::spawn_blocking(move || optwire_cmd().args(args).output().unwrap())
        .await
        .unwrap()
}

fn args(config: &NamedTempFile, rest: &[&str]) -> Vec<String> {
    let mut all = vec![
        "--config".to_owned(),
        config.path().display().to_string(),
        "--color".to_owned(),
        "never".to_owned(),
    ];
    all.extend(rest.iter().map(|s| (*s).to_owned()));
    all
}

async fn mount_directory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": format!("{}/people", server.uri())
        })))
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let output = optwire_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    optwire_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("directory")
            .and(predicate::str::contains("request"))
            .and(predicate::str::contains("options")),
    );
}

#[test]
fn completions_zsh() {
    optwire_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn invalid_verb_is_a_usage_error() {
    optwire_cmd()
        .args(["request", "main", "--verb", "FETCH"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown verb"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn apis_lists_configured_names() {
    let config = backend_config("http://backend.test");
    optwire_cmd()
        .args(args(&config, &["-o", "plain", "apis"]))
        .assert()
        .success()
        .stdout(predicate::str::diff("main\n"));
}

#[test]
fn apis_table_highlights_names_only_with_color() {
    let config = backend_config("http://backend.test");
    let plain = optwire_cmd()
        .args(args(&config, &["apis"]))
        .output()
        .unwrap();
    assert!(plain.status.success());
    let stdout = String::from_utf8_lossy(&plain.stdout);
    assert!(stdout.contains("main"));
    assert!(!stdout.contains('\u{1b}'));

    let colored = optwire_cmd()
        .args([
            "--config",
            &config.path().display().to_string(),
            "--color",
            "always",
            "apis",
        ])
        .output()
        .unwrap();
    assert!(colored.status.success());
    assert!(String::from_utf8_lossy(&colored.stdout).contains('\u{1b}'));
}

#[test]
fn config_show_masks_passwords() {
    let config = write_config(
        r#"
        [apis.main]
        url = "http://backend.test/"
        [apis.main.auth]
        mode = "token"
        token_url = "/_token"
        username = "ann"
        password = "hunter2"
        "#,
    );
    optwire_cmd()
        .args(args(&config, &["config", "show"]))
        .assert()
        .success()
        .stdout(predicate::str::contains("****").and(predicate::str::contains("hunter2").not()));
}

#[test]
fn unknown_field_exits_not_found() {
    let config = backend_config("http://backend.test");
    optwire_cmd()
        .args(args(&config, &["options", "nope"]))
        .assert()
        .code(4)
        .stderr(predicate::str::contains("field 'nope' not found"));
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test]
async fn directory_lists_resolved_entries() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    let config = backend_config(&server.uri());

    let output = run(args(&config, &["-o", "plain", "directory", "main"])).await;
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("users\t{}/people", server.uri()));
}

#[tokio::test]
async fn request_prints_response_json() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    Mock::given(method("GET"))
        .and(path("/people/active"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": [], "total": 0})))
        .expect(1)
        .mount(&server)
        .await;
    let config = backend_config(&server.uri());

    let output = run(args(
        &config,
        &[
            "-o", "json-compact", "request", "main", "-t", "users", "--path", "active", "-P",
            "limit=5",
        ],
    ))
    .await;
    assert!(output.status.success(), "{output:?}");
    let reply: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reply, json!({"status": 200, "data": {"result": [], "total": 0}}));
}

#[tokio::test]
async fn options_pages_until_exhausted() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    Mock::given(method("GET"))
        .and(path("/people"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{"id": 1, "name": "Ann"}, {"id": 2, "name": "Bob"}],
            "total": 3,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{"id": 3, "name": "Cy"}],
            "total": 3,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let config = backend_config(&server.uri());

    let output = run(args(
        &config,
        &["-o", "plain", "options", "owner", "--more", "5", "--value", "2"],
    ))
    .await;
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "1\tAnn\n2\tBob\n3\tCy\n"
    );
}

#[tokio::test]
async fn failed_directory_exits_with_connection_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let config = backend_config(&server.uri());

    let output = run(args(&config, &["directory", "main"])).await;
    assert_eq!(output.status.code(), Some(7));
    assert!(String::from_utf8_lossy(&output.stderr).contains("directory of 'main'"));
}
